//! Runtime settings and the persisted per-device key/value store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::debug;

use crate::types::{DeviceClass, TempUnit};
use crate::{Error, Result};

const LOG_LEVEL_KEY: &str = "loggerlevel";

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Host-supplied settings. Every field has a default.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Semicolon-separated hostnames. When set, SSDP search is skipped.
    pub hostnames: Option<String>,
    pub pin: Option<String>,
    /// Seconds between state polls.
    pub short_poll: u64,
    /// Seconds between sensor/alert polls.
    pub long_poll: u64,
    pub discovery_timeout: u64,
    pub log_level: LogLevel,
    pub message_log: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hostnames: None,
            pin: None,
            short_poll: 20,
            long_poll: 60,
            discovery_timeout: 10,
            log_level: LogLevel::Info,
            message_log: None,
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Configured hostnames, or None for dynamic discovery.
    pub fn static_hosts(&self) -> Option<Vec<String>> {
        let raw = self.hostnames.as_deref()?;
        Some(
            raw.split(';')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn short_poll_interval(&self) -> Duration {
        Duration::from_secs(self.short_poll)
    }

    pub fn long_poll_interval(&self) -> Duration {
        Duration::from_secs(self.long_poll)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout)
    }
}

/// What the host persists for each thermostat node.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub hostname: String,
    pub class: DeviceClass,
    pub temp_unit: TempUnit,
    pub name: Option<String>,
}

impl DeviceRecord {
    /// `hostname;class;unit[;name]`
    pub fn encode(&self) -> String {
        let mut out = format!(
            "{};{};{}",
            self.hostname,
            self.class.as_vendor_str(),
            self.temp_unit.as_raw()
        );
        if let Some(name) = &self.name {
            out.push(';');
            out.push_str(name);
        }
        out
    }

    pub fn parse(s: &str) -> Option<Self> {
        let mut fields = s.splitn(4, ';');
        let hostname = fields.next().filter(|h| !h.is_empty())?.to_string();
        let class = DeviceClass::from_vendor_str(fields.next()?)?;
        let temp_unit = TempUnit::from_raw(fields.next()?.parse().ok()?);
        let name = fields.next().map(str::to_string);
        Some(Self {
            hostname,
            class,
            temp_unit,
            name,
        })
    }
}

/// What the host persists for each remote sensor node.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub parent: String,
    pub name: String,
}

impl SensorRecord {
    const TAG: &'static str = "sensor";

    /// `sensor;parent;name`
    pub fn encode(&self) -> String {
        format!("{};{};{}", Self::TAG, self.parent, self.name)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let mut fields = s.splitn(3, ';');
        if fields.next()? != Self::TAG {
            return None;
        }
        let parent = fields.next().filter(|p| !p.is_empty())?.to_string();
        let name = fields.next()?.to_string();
        Some(Self { parent, name })
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    data: BTreeMap<String, String>,
    path: Option<PathBuf>,
}

/// Shared handle to the persisted key/value data. Clones see the same map.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl ConfigStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a JSON-backed store. A missing file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner {
                data,
                path: Some(path),
            })),
        })
    }

    pub fn save(&self) -> Result<()> {
        let inner = self.lock();
        let Some(path) = &inner.path else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(&inner.data)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), entries = inner.data.len(), "saved config store");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().data.get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().data.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.lock().data.remove(key)
    }

    pub fn device_record(&self, address: &str) -> Option<DeviceRecord> {
        self.get(address).as_deref().and_then(DeviceRecord::parse)
    }

    pub fn set_device_record(&self, address: &str, record: &DeviceRecord) {
        self.set(address, record.encode());
    }

    /// Keys holding a device record, in key order.
    pub fn device_addresses(&self) -> Vec<String> {
        self.lock()
            .data
            .iter()
            .filter(|(_, v)| DeviceRecord::parse(v).is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn sensor_record(&self, address: &str) -> Option<SensorRecord> {
        self.get(address).as_deref().and_then(SensorRecord::parse)
    }

    pub fn set_sensor_record(&self, address: &str, record: &SensorRecord) {
        self.set(address, record.encode());
    }

    /// Keys holding a sensor record, in key order.
    pub fn sensor_addresses(&self) -> Vec<String> {
        self.lock()
            .data
            .iter()
            .filter(|(_, v)| SensorRecord::parse(v).is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.get(LOG_LEVEL_KEY).as_deref().and_then(LogLevel::parse)
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.set(LOG_LEVEL_KEY, level.as_str());
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_and_hosts() {
        let settings =
            Settings::from_toml_str("hostnames = \"thermo1.lan; thermo2.lan;\"").unwrap();
        assert_eq!(
            settings.static_hosts(),
            Some(vec!["thermo1.lan".to_string(), "thermo2.lan".to_string()])
        );
        assert_eq!(settings.short_poll, 20);
        assert_eq!(settings.log_level, LogLevel::Info);
        assert_eq!(Settings::default().static_hosts(), None);
    }

    #[test]
    fn settings_log_level() {
        let settings = Settings::from_toml_str("log_level = \"debug\"\nlong_poll = 120").unwrap();
        assert_eq!(LevelFilter::from(settings.log_level), LevelFilter::DEBUG);
        assert_eq!(settings.long_poll_interval(), Duration::from_secs(120));
        assert!(Settings::from_toml_str("log_level = \"loud\"").is_err());
    }

    #[test]
    fn device_record_encoding() {
        let rec = DeviceRecord {
            hostname: "thermo1.lan".into(),
            class: DeviceClass::Residential,
            temp_unit: TempUnit::Celsius,
            name: None,
        };
        assert_eq!(rec.encode(), "thermo1.lan;residential;1");
        assert_eq!(DeviceRecord::parse(&rec.encode()), Some(rec));

        let named = DeviceRecord::parse("10.0.0.5;residential;0;Upstairs").unwrap();
        assert_eq!(named.name.as_deref(), Some("Upstairs"));
        assert_eq!(named.temp_unit, TempUnit::Fahrenheit);

        assert!(DeviceRecord::parse("info").is_none());
        assert!(DeviceRecord::parse("h;industrial;0").is_none());
    }

    #[test]
    fn sensor_record_encoding() {
        let rec = SensorRecord {
            parent: "7f000001".into(),
            name: "Outdoor; north".into(),
        };
        assert_eq!(rec.encode(), "sensor;7f000001;Outdoor; north");
        assert_eq!(SensorRecord::parse(&rec.encode()), Some(rec.clone()));
        assert!(DeviceRecord::parse(&rec.encode()).is_none());
        assert!(SensorRecord::parse("127.0.0.1;residential;0").is_none());

        let store = ConfigStore::in_memory();
        store.set_sensor_record("7f000001_s0", &rec);
        store.set("7f000001", "127.0.0.1;residential;0");
        assert_eq!(store.sensor_addresses(), vec!["7f000001_s0".to_string()]);
        assert_eq!(store.device_addresses(), vec!["7f000001".to_string()]);
        assert_eq!(store.sensor_record("7f000001_s0"), Some(rec));
    }

    #[test]
    fn store_handles_share_state() {
        let store = ConfigStore::in_memory();
        let other = store.clone();
        store.set_log_level(LogLevel::Warn);
        other.set_device_record(
            "7f000001",
            &DeviceRecord {
                hostname: "127.0.0.1".into(),
                class: DeviceClass::Residential,
                temp_unit: TempUnit::Fahrenheit,
                name: Some("Hall".into()),
            },
        );
        assert_eq!(store.log_level(), Some(LogLevel::Warn));
        assert_eq!(store.device_addresses(), vec!["7f000001".to_string()]);
        store.save().unwrap();
    }

    #[test]
    fn store_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        let store = ConfigStore::load(&path).unwrap();
        assert!(store.device_addresses().is_empty());
        store.set("7f000001", "127.0.0.1;residential;1");
        store.save().unwrap();

        let reloaded = ConfigStore::load(&path).unwrap();
        let rec = reloaded.device_record("7f000001").unwrap();
        assert_eq!(rec.temp_unit, TempUnit::Celsius);
    }
}
