//! Durable controller state.
//!
//! Each durable entity is its own postcard blob under the `"fridge"`
//! namespace so a corrupted chunk only costs that chunk:
//!
//! | key       | contents                              |
//! |-----------|---------------------------------------|
//! | `relay`   | [`RelayState`]                        |
//! | `alarm`   | latched fatal [`Alarm`] (or `None`)   |
//! | `faults`  | [`FaultLog`]                          |
//! | `hyst`    | stored hysteresis half-width (°C)     |
//! | `metrics` | [`MetricsAccumulator`]                |
//!
//! Loading never fails: a missing or undecodable chunk falls back to its
//! default and is logged.

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::alarms::{Alarm, FaultLog};
use crate::app::ports::{StorageError, StoragePort};
use crate::control::switch::RelayState;
use crate::metrics::MetricsAccumulator;

pub const NAMESPACE: &str = "fridge";

const KEY_RELAY: &str = "relay";
const KEY_ALARM: &str = "alarm";
const KEY_FAULTS: &str = "faults";
const KEY_HYST: &str = "hyst";
const KEY_METRICS: &str = "metrics";

/// Largest encoded chunk (the fault log with every queue full).
const MAX_CHUNK: usize = 1024;

/// Everything that survives a reboot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableState {
    pub relay: RelayState,
    pub fatal: Alarm,
    pub faults: FaultLog,
    pub hysteresis_c: f32,
    pub metrics: MetricsAccumulator,
}

impl DurableState {
    pub fn fresh(default_hysteresis_c: f32) -> Self {
        Self {
            relay: RelayState::default(),
            fatal: Alarm::None,
            faults: FaultLog::default(),
            hysteresis_c: default_hysteresis_c,
            metrics: MetricsAccumulator::default(),
        }
    }
}

/// Load every chunk, substituting defaults for anything missing or corrupt.
pub fn load(storage: &dyn StoragePort, default_hysteresis_c: f32) -> DurableState {
    let fresh = DurableState::fresh(default_hysteresis_c);
    DurableState {
        relay: read_or(storage, KEY_RELAY, fresh.relay),
        fatal: read_or(storage, KEY_ALARM, fresh.fatal),
        faults: read_or(storage, KEY_FAULTS, fresh.faults),
        hysteresis_c: read_or(storage, KEY_HYST, fresh.hysteresis_c),
        metrics: read_or(storage, KEY_METRICS, fresh.metrics),
    }
}

/// Write every chunk. Stops at the first failing write.
pub fn save(storage: &mut dyn StoragePort, state: &DurableState) -> Result<(), StorageError> {
    write_chunk(storage, KEY_RELAY, &state.relay)?;
    save_faults(storage, state.fatal, &state.faults)?;
    write_chunk(storage, KEY_HYST, &state.hysteresis_c)?;
    write_chunk(storage, KEY_METRICS, &state.metrics)?;
    debug!("durable state flushed");
    Ok(())
}

/// Inline path for fatal faults: only the alarm and the fault log.
pub fn save_faults(
    storage: &mut dyn StoragePort,
    fatal: Alarm,
    faults: &FaultLog,
) -> Result<(), StorageError> {
    write_chunk(storage, KEY_ALARM, &fatal)?;
    write_chunk(storage, KEY_FAULTS, faults)
}

fn write_chunk<T: Serialize>(
    storage: &mut dyn StoragePort,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let bytes = postcard::to_allocvec(value).map_err(|_| StorageError::Corrupted)?;
    storage.write(NAMESPACE, key, &bytes)
}

fn read_chunk<T: DeserializeOwned>(storage: &dyn StoragePort, key: &str) -> Result<T, StorageError> {
    let mut buf = [0u8; MAX_CHUNK];
    let len = storage.read(NAMESPACE, key, &mut buf)?;
    let bytes = buf.get(..len).ok_or(StorageError::Corrupted)?;
    postcard::from_bytes(bytes).map_err(|_| StorageError::Corrupted)
}

fn read_or<T: DeserializeOwned>(storage: &dyn StoragePort, key: &str, default: T) -> T {
    match read_chunk(storage, key) {
        Ok(v) => v,
        Err(StorageError::NotFound) => default,
        Err(e) => {
            warn!("persist: chunk '{key}' unreadable ({e}), using default");
            default
        }
    }
}
