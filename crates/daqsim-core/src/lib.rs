//! DAQ Simulator Core
//!
//! Simulates a data-acquisition module: quantized analogue and digital
//! sensors sampled on a schedule, moving-average smoothing per analogue
//! channel, and a delimited append-only data log.

pub mod bank;
pub mod config;
pub mod datalog;
pub mod error;
pub mod filter;
pub mod sensor;
pub mod timer;

pub use bank::{BankConfig, SensorBank};
pub use config::ConfigLookup;
pub use datalog::DataLog;
pub use error::{Error, Result};
pub use filter::MovingAverageFilter;
pub use sensor::{AnalogueSensor, DigitalSensor, Sensor};
pub use timer::{IntervalTimer, TimerState};

/// Default delimiter between log fields
pub const DEFAULT_DELIMITER: char = ',';

/// Default moving-average window length
pub const DEFAULT_WINDOW: usize = 10;
