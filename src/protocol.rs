use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::TempUnit;

pub const PATH_API_INFO: &str = "/";
pub const PATH_QUERY_INFO: &str = "/query/info";
pub const PATH_QUERY_SENSORS: &str = "/query/sensors";
pub const PATH_QUERY_ALERTS: &str = "/query/alerts";
pub const PATH_CONTROL: &str = "/control";
pub const PATH_SETTINGS: &str = "/settings";

pub const MINIMUM_API_LEVEL: u32 = 4;

pub const ALERT_AIR_FILTER: &str = "Air Filter";
pub const ALERT_UV_LAMP: &str = "UV Lamp";
pub const ALERT_SERVICE: &str = "Service";

/// Sensor entry that mirrors the thermostat's own reading.
pub const SPACE_TEMP_SENSOR: &str = "Space Temp";

pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";
pub const SSDP_SEARCH_TARGET: &str = "colortouch:ecp";

/// `GET /` capability document.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiInfo {
    #[serde(default)]
    pub api_ver: u32,
    #[serde(rename = "type")]
    pub class: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub firmware: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAlert {
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsPayload {
    #[serde(default)]
    pub alerts: Vec<RawAlert>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSensor {
    pub name: String,
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub battery: Option<u8>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorsPayload {
    #[serde(default)]
    pub sensors: Vec<RawSensor>,
}

/// `GET /query/info` state document (residential variant).
#[derive(Debug, Clone, Deserialize)]
pub struct InfoPayload {
    #[serde(default)]
    pub name: String,
    pub mode: u8,
    pub state: u8,
    pub fan: u8,
    #[serde(default)]
    pub fanstate: u8,
    pub tempunits: u8,
    #[serde(default)]
    pub schedule: u8,
    #[serde(default = "inactive_schedule_part")]
    pub schedulepart: u8,
    pub away: u8,
    pub spacetemp: f64,
    pub heattemp: f64,
    pub cooltemp: f64,
    #[serde(default)]
    pub heattempmin: Option<f64>,
    #[serde(default)]
    pub heattempmax: Option<f64>,
    #[serde(default)]
    pub cooltempmin: Option<f64>,
    #[serde(default)]
    pub cooltempmax: Option<f64>,
    #[serde(default)]
    pub setpointdelta: f64,
    #[serde(default)]
    pub hum: f64,
    #[serde(default)]
    pub hum_setpoint: Option<u8>,
    #[serde(default)]
    pub dehum_setpoint: Option<u8>,
    /// Present on firmware that embeds alerts in the info document.
    #[serde(default)]
    pub alerts: Option<Vec<RawAlert>>,
    #[serde(default)]
    pub sensors: Option<Vec<RawSensor>>,
}

fn inactive_schedule_part() -> u8 {
    255
}

/// Form body for `POST /control`. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heattemp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooltemp: Option<f64>,
}

impl ControlRequest {
    pub fn setpoints(heat: f64, cool: f64) -> Self {
        Self {
            heattemp: Some(heat),
            cooltemp: Some(cool),
            ..Default::default()
        }
    }

    pub fn mode(mode: u8, heat: f64, cool: f64) -> Self {
        Self {
            mode: Some(mode),
            heattemp: Some(heat),
            cooltemp: Some(cool),
            ..Default::default()
        }
    }

    pub fn fan(fan: u8) -> Self {
        Self {
            fan: Some(fan),
            ..Default::default()
        }
    }

    pub fn form_pairs(&self, pin: Option<&str>) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(mode) = self.mode {
            pairs.push(("mode", mode.to_string()));
        }
        if let Some(fan) = self.fan {
            pairs.push(("fan", fan.to_string()));
        }
        if let Some(heat) = self.heattemp {
            pairs.push(("heattemp", format_temp(heat)));
        }
        if let Some(cool) = self.cooltemp {
            pairs.push(("cooltemp", format_temp(cool)));
        }
        if let Some(pin) = pin {
            pairs.push(("pin", pin.to_string()));
        }
        pairs
    }
}

/// Whole degrees without a fraction, half degrees as-is.
fn format_temp(t: f64) -> String {
    if t.fract() == 0.0 {
        format!("{t:.0}")
    } else {
        format!("{t}")
    }
}

/// A single `POST /settings` name/value pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting {
    TempUnits(TempUnit),
    Away(bool),
    Schedule(bool),
    HumidifySetpoint(u8),
    DehumidifySetpoint(u8),
}

impl Setting {
    pub fn name(&self) -> &'static str {
        match self {
            Setting::TempUnits(_) => "tempunits",
            Setting::Away(_) => "away",
            Setting::Schedule(_) => "schedule",
            Setting::HumidifySetpoint(_) => "hum_setpoint",
            Setting::DehumidifySetpoint(_) => "dehum_setpoint",
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            Setting::TempUnits(unit) => unit.as_raw(),
            Setting::Away(on) | Setting::Schedule(on) => *on as u8,
            Setting::HumidifySetpoint(v) | Setting::DehumidifySetpoint(v) => *v,
        }
    }

    pub fn form_pairs(&self, pin: Option<&str>) -> Vec<(&'static str, String)> {
        let mut pairs = vec![(self.name(), self.value().to_string())];
        if let Some(pin) = pin {
            pairs.push(("pin", pin.to_string()));
        }
        pairs
    }
}

/// Inspect a 200 response to a write. `Err` carries the device's reason.
pub fn command_outcome(body: &Value) -> std::result::Result<(), String> {
    match body.get("error") {
        Some(_) => Err(body
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("unspecified")
            .to_string()),
        None => Ok(()),
    }
}

/// Active flag for a named alert; absent alerts read as inactive.
pub fn alert_active(alerts: &[RawAlert], name: &str) -> bool {
    alerts
        .iter()
        .find(|a| a.name == name)
        .map(|a| a.active)
        .unwrap_or(false)
}

pub fn search_request(mx_secs: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_MULTICAST_ADDR}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {mx_secs}\r\n\
         ST: {SSDP_SEARCH_TARGET}\r\n\
         \r\n"
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub usn: String,
    pub location: String,
}

/// Pull USN and LOCATION out of a search response. Header names are
/// case-insensitive.
pub fn parse_advertisement(text: &str) -> Option<Advertisement> {
    let mut usn = None;
    let mut location = None;
    for line in text.lines().skip(1) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "usn" => usn = Some(value.to_string()),
            "location" => location = Some(value.to_string()),
            _ => {}
        }
    }
    Some(Advertisement {
        usn: usn?,
        location: location?,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsnParts {
    pub id: String,
    pub name: String,
    pub class: String,
}

/// Parse `ecp:<mac>:name:<urlencoded name>:type:<class>`.
pub fn parse_usn(usn: &str) -> Option<UsnParts> {
    let id_start = usn.find("ecp:")? + 4;
    let name_marker = usn.find(":name:")?;
    let type_marker = usn.find(":type:")?;
    if name_marker < id_start || type_marker < name_marker {
        return None;
    }
    let id = usn[id_start..name_marker].replace(':', "");
    let raw_name = &usn[name_marker + 6..type_marker];
    let name = String::from_utf8_lossy(&urlencoding::decode_binary(raw_name.as_bytes()))
        .into_owned();
    let class = usn[type_marker + 6..].trim().to_string();
    Some(UsnParts { id, name, class })
}

/// Host (and port, if any) of a location URL.
pub fn location_host(location: &str) -> Option<String> {
    let url = reqwest::Url::parse(location).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
