//! In-memory key-value store.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] on a `HashMap`, for
//! the simulator and the test-suite. A flash-backed adapter on the target
//! board implements the same two ports.
//!
//! - Namespace isolation: keys are stored as `namespace::key`.
//! - Config validation: [`SystemConfig::validate`] runs before every save.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use log::info;

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SystemConfig;

const CONFIG_NAMESPACE: &str = "fridgeguard";
const CONFIG_KEY: &str = "syscfg";

#[derive(Debug, Default)]
pub struct MemoryStore {
    store: RefCell<HashMap<String, Vec<u8>>>,
    writes: Cell<u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("MemoryStore: volatile backend");
        Self::default()
    }

    /// Number of successful writes so far, config saves included.
    pub fn write_count(&self) -> u32 {
        self.writes.get()
    }

    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    fn put(&self, namespace: &str, key: &str, data: &[u8]) {
        self.store
            .borrow_mut()
            .insert(Self::composite_key(namespace, key), data.to_vec());
        self.writes.set(self.writes.get() + 1);
    }
}

impl ConfigPort for MemoryStore {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
        if let Some(bytes) = self.store.borrow().get(&key) {
            let cfg: SystemConfig =
                postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
            cfg.validate()?;
            info!("MemoryStore: loaded config from store");
            Ok(cfg)
        } else {
            info!("MemoryStore: no stored config, using defaults");
            Ok(SystemConfig::default())
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.put(CONFIG_NAMESPACE, CONFIG_KEY, &bytes);
        info!("MemoryStore: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for MemoryStore {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let composite = Self::composite_key(namespace, key);
        match self.store.borrow().get(&composite) {
            Some(data) if data.len() > buf.len() => Err(StorageError::Full),
            Some(data) => {
                buf[..data.len()].copy_from_slice(data);
                Ok(data.len())
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.put(namespace, key, data);
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store
            .borrow_mut()
            .remove(&Self::composite_key(namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store
            .borrow()
            .contains_key(&Self::composite_key(namespace, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_round_trip() {
        let mut store = MemoryStore::new();
        let data = b"hello flash";
        store.write("test_ns", "greeting", data).unwrap();
        assert!(store.exists("test_ns", "greeting"));

        let mut buf = [0u8; 64];
        let len = store.read("test_ns", "greeting", &mut buf).unwrap();
        assert_eq!(&buf[..len], data);

        store.delete("test_ns", "greeting").unwrap();
        assert!(!store.exists("test_ns", "greeting"));
    }

    #[test]
    fn storage_read_missing_key() {
        let store = MemoryStore::new();
        let mut buf = [0u8; 64];
        assert_eq!(
            store.read("ns", "nope", &mut buf),
            Err(StorageError::NotFound)
        );
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut store = MemoryStore::new();
        store.write("ns", "k", &[1u8; 32]).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(store.read("ns", "k", &mut buf), Err(StorageError::Full));
    }

    #[test]
    fn namespaces_are_isolated() {
        let mut store = MemoryStore::new();
        store.write("a", "k", b"1").unwrap();
        assert!(!store.exists("b", "k"));
    }

    #[test]
    fn config_defaults_then_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), SystemConfig::default());

        let cfg = SystemConfig {
            target_temp_c: 3.0,
            ..Default::default()
        };
        store.save(&cfg).unwrap();
        assert_eq!(store.load().unwrap().target_temp_c, 3.0);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn invalid_config_not_persisted() {
        let store = MemoryStore::new();
        let cfg = SystemConfig {
            ema_alpha: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            store.save(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn corrupted_config_reported() {
        let mut store = MemoryStore::new();
        store.write(CONFIG_NAMESPACE, CONFIG_KEY, &[0xff; 3]).unwrap();
        assert_eq!(store.load(), Err(ConfigError::Corrupted));
    }
}
