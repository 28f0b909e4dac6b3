use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::*;
use crate::types::DeviceClass;
use crate::{Error, Result};

const GET_TIMEOUT: Duration = Duration::from_millis(6050);
const POST_TIMEOUT: Duration = Duration::from_millis(4050);

pub struct DeviceSessionBuilder {
    host: String,
    protocol: String,
    pin: Option<String>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
    get_timeout: Duration,
    post_timeout: Duration,
}

impl DeviceSessionBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            protocol: "http".to_string(),
            pin: None,
            log_mode: None,
            log_path: None,
            get_timeout: GET_TIMEOUT,
            post_timeout: POST_TIMEOUT,
        }
    }

    pub fn protocol(mut self, proto: &str) -> Self {
        self.protocol = proto.to_string();
        self
    }

    /// Screen-lock PIN sent along with every write.
    pub fn pin(mut self, pin: Option<String>) -> Self {
        self.pin = pin.filter(|p| !p.is_empty());
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn timeouts(mut self, get: Duration, post: Duration) -> Self {
        self.get_timeout = get;
        self.post_timeout = post;
        self
    }

    pub fn build(self) -> Result<DeviceSession> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, &path)?),
            _ => None,
        };

        Ok(DeviceSession {
            http: Some(http),
            base_url: format!("{}://{}", self.protocol, self.host),
            host: self.host,
            pin: self.pin,
            get_timeout: self.get_timeout,
            post_timeout: self.post_timeout,
            logger,
        })
    }
}

/// One persistent HTTP client bound to a single thermostat.
pub struct DeviceSession {
    http: Option<reqwest::Client>,
    host: String,
    base_url: String,
    pin: Option<String>,
    get_timeout: Duration,
    post_timeout: Duration,
    logger: Option<MessageLogger>,
}

impl DeviceSession {
    pub fn builder(host: impl Into<String>) -> DeviceSessionBuilder {
        DeviceSessionBuilder::new(host)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_open(&self) -> bool {
        self.http.is_some()
    }

    pub async fn fetch_api_info(&mut self) -> Result<ApiInfo> {
        self.get_json(PATH_API_INFO).await
    }

    pub async fn fetch_info(&mut self) -> Result<InfoPayload> {
        self.get_json(PATH_QUERY_INFO).await
    }

    pub async fn fetch_sensors(&mut self) -> Result<SensorsPayload> {
        self.get_json(PATH_QUERY_SENSORS).await
    }

    pub async fn fetch_alerts(&mut self) -> Result<AlertsPayload> {
        self.get_json(PATH_QUERY_ALERTS).await
    }

    pub async fn post_control(&mut self, request: &ControlRequest) -> Result<()> {
        if let Some(ref mut logger) = self.logger {
            logger.log_command(&self.host, "control", &serde_json::to_value(request)?);
        }
        let pairs = request.form_pairs(self.pin.as_deref());
        self.post_form(PATH_CONTROL, &pairs).await
    }

    pub async fn post_setting(&mut self, setting: Setting) -> Result<()> {
        if let Some(ref mut logger) = self.logger {
            let mut body = serde_json::Map::new();
            body.insert(setting.name().to_string(), json!(setting.value()));
            logger.log_command(&self.host, "settings", &Value::Object(body));
        }
        let pairs = setting.form_pairs(self.pin.as_deref());
        self.post_form(PATH_SETTINGS, &pairs).await
    }

    /// Release the HTTP client. Later calls report Unavailable.
    pub fn close(&mut self) {
        if self.http.take().is_some() {
            debug!(host = %self.host, "closed thermostat session");
        }
    }

    async fn get_json<T: DeserializeOwned>(&mut self, path: &str) -> Result<T> {
        let http = self.client(path)?;
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");
        if let Some(ref mut logger) = self.logger {
            logger.log_request(&self.host, "GET", path, None);
        }

        let sent = http.get(&url).timeout(self.get_timeout).send().await;
        let body = self.read_body(path, sent).await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn post_form(&mut self, path: &str, pairs: &[(&'static str, String)]) -> Result<()> {
        let http = self.client(path)?;
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");
        if let Some(ref mut logger) = self.logger {
            let body: serde_json::Map<String, Value> = pairs
                .iter()
                .filter(|(k, _)| *k != "pin")
                .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
                .collect();
            logger.log_request(&self.host, "POST", path, Some(&Value::Object(body)));
        }

        let sent = http
            .post(&url)
            .form(pairs)
            .timeout(self.post_timeout)
            .send()
            .await;
        let body = self.read_body(path, sent).await?;
        command_outcome(&body).map_err(|reason| Error::Rejected { reason })
    }

    fn client(&mut self, path: &str) -> Result<reqwest::Client> {
        match &self.http {
            Some(http) => Ok(http.clone()),
            None => Err(self.unavailable(path, "session closed".to_string())),
        }
    }

    async fn read_body(
        &mut self,
        path: &str,
        sent: std::result::Result<reqwest::Response, reqwest::Error>,
    ) -> Result<Value> {
        let resp = match sent {
            Ok(resp) => resp,
            Err(e) => return Err(self.classify(path, e)),
        };

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            let reason = "HTTP 401 (PIN or credentials required)".to_string();
            return Err(self.unavailable(path, reason));
        }
        if !status.is_success() {
            return Err(self.unavailable(path, format!("HTTP {status}")));
        }

        let body: Value = match resp.json().await {
            Ok(body) => body,
            Err(e) if e.is_decode() => {
                return Err(Error::Protocol(format!(
                    "{path}: malformed JSON from {}: {e}",
                    self.host
                )));
            }
            Err(e) => return Err(self.classify(path, e)),
        };

        if let Some(ref mut logger) = self.logger {
            logger.log_response(&self.host, path, status.as_u16(), &body);
        }
        Ok(body)
    }

    /// Network-level failures become Unavailable; anything else is a fault.
    fn classify(&mut self, path: &str, e: reqwest::Error) -> Error {
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            self.unavailable(path, e.to_string())
        } else {
            Error::Http(e)
        }
    }

    fn unavailable(&mut self, path: &str, reason: String) -> Error {
        warn!(host = %self.host, path, %reason, "thermostat request failed");
        if let Some(ref mut logger) = self.logger {
            logger.log_failure(&self.host, path, &reason);
        }
        Error::Unavailable {
            host: self.host.clone(),
            reason,
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Capability and identity data for a supported host.
#[derive(Debug, Clone)]
pub struct Probe {
    pub api: ApiInfo,
    pub info: InfoPayload,
    pub sensors: Vec<RawSensor>,
}

#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    Residential(Probe),
    /// Any other device class. The info document is never read.
    Unsupported(ApiInfo),
}

/// One-shot query of `GET /` and, for residential devices, `GET /query/info`
/// plus the sensor roster. A missing sensor list is treated as empty.
pub async fn probe(session: &mut DeviceSession) -> Result<ProbeOutcome> {
    let api = session.fetch_api_info().await?;
    if DeviceClass::from_vendor_str(&api.class) != Some(DeviceClass::Residential) {
        return Ok(ProbeOutcome::Unsupported(api));
    }
    let mut info = session.fetch_info().await?;
    let sensors = match info.sensors.take() {
        Some(sensors) => sensors,
        None => match session.fetch_sensors().await {
            Ok(payload) => payload.sensors,
            Err(e) if e.is_unavailable() => Vec::new(),
            Err(e) => return Err(e),
        },
    };
    Ok(ProbeOutcome::Residential(Probe { api, info, sensors }))
}
