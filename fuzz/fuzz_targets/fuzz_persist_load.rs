//! Fuzz target: durable state loading
//!
//! Writes arbitrary bytes into every persisted chunk and verifies:
//! - `persist::load` never panics on corrupt or truncated blobs
//! - every fault queue decoded from flash still holds at most 3 entries
//! - a service restored from the blobs only latches fatal alarms
//! - a garbage stored hysteresis still yields an in-bounds band
//!
//! cargo fuzz run fuzz_persist_load

#![no_main]

use fridgeguard::adapters::memory_store::MemoryStore;
use fridgeguard::alarms::{Alarm, FAULT_QUEUE_CAP, Severity};
use fridgeguard::app::ports::StoragePort;
use fridgeguard::app::service::ControlService;
use fridgeguard::config::SystemConfig;
use fridgeguard::persist::{self, NAMESPACE};
use libfuzzer_sys::fuzz_target;

const KEYS: [&str; 5] = ["relay", "alarm", "faults", "hyst", "metrics"];

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the split points; the rest is spread over the chunks.
    let body = &data[1..];
    let step = (usize::from(data[0]) % 64) + 1;
    let mut store = MemoryStore::new();
    for (i, key) in KEYS.iter().enumerate() {
        let start = (i * step).min(body.len());
        let end = (start + step).min(body.len());
        let _ = store.write(NAMESPACE, key, &body[start..end]);
    }

    let state = persist::load(&store, 1.0);
    for sev in Severity::ALL {
        assert!(state.faults.queue(sev).len() <= FAULT_QUEUE_CAP);
    }

    let cfg = SystemConfig::default();
    let svc = ControlService::from_state(cfg.clone(), state, 0);
    let alarm = svc.alarms().current();
    assert!(alarm == Alarm::None || alarm.is_fatal());
    let band = svc.hysteresis().effective_c(&cfg);
    assert!(band >= cfg.hyst_min_c && band <= cfg.hyst_max_c);
});
