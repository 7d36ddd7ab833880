//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                  |
//! |----------------|--------------------|------------------------------|
//! | `log_sink`     | EventSink          | `log` facade / serial        |
//! | `memory_store` | ConfigPort         | in-memory key-value store    |
//! |                | StoragePort        |                              |
//! | `relay`        | RelayPort          | `embedded-hal` output pin    |
//! | `sim`          | SensorPort         | two-node thermal model       |
//! |                | RelayPort          |                              |
//! | `time`         | Clock              | `std::time` monotonic + wall |

pub mod log_sink;
pub mod memory_store;
pub mod relay;
pub mod sim;
pub mod time;
