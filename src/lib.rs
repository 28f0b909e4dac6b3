pub mod command;
mod config;
mod controller;
mod diff;
pub mod discovery;
mod error;
mod logger;
pub mod protocol;
mod session;
mod thermostat;
pub mod translate;
mod types;

pub use command::{Command, Direction};
pub use config::{ConfigStore, DeviceRecord, LogLevel, SensorRecord, Settings};
pub use controller::{Controller, DiscoveryReport};
pub use error::{Error, Result, ValidationFailure};
pub use logger::MessageLogMode;
pub use session::{probe, DeviceSession, DeviceSessionBuilder, Probe, ProbeOutcome};
pub use thermostat::{EventCallback, SensorNode, Thermostat};
pub use types::*;
