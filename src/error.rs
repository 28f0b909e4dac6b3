use std::fmt;

/// Reasons a command is refused before the thermostat is contacted.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationFailure {
    AwayActive,
    ModeOff,
    SetpointSeparation { heat: f64, cool: f64, min_separation: f64 },
    SetpointOutOfRange { value: f64, min: f64, max: f64 },
    SettingOutOfRange { setting: &'static str, value: u8, min: u8, max: u8 },
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::AwayActive => write!(f, "thermostat is in Away mode"),
            ValidationFailure::ModeOff => write!(f, "thermostat is in Off mode"),
            ValidationFailure::SetpointSeparation {
                heat,
                cool,
                min_separation,
            } => write!(
                f,
                "heat setpoint {heat} and cool setpoint {cool} must be at least \
                 {min_separation} degrees apart in Auto mode"
            ),
            ValidationFailure::SetpointOutOfRange { value, min, max } => {
                write!(f, "setpoint {value} outside {min}..={max}")
            }
            ValidationFailure::SettingOutOfRange {
                setting,
                value,
                min,
                max,
            } => write!(f, "{setting} value {value} outside {min}..={max}"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    /// Timeout, connection failure or unusable HTTP status. Recovered locally.
    Unavailable { host: String, reason: String },
    /// The thermostat answered 200 but reported an application error.
    Rejected { reason: String },
    Validation(ValidationFailure),
    /// Malformed payload from the device.
    Protocol(String),
    Http(reqwest::Error),
    UnknownNode(String),
    Config(String),
    Io(std::io::Error),
}

impl Error {
    /// True for failures the caller is expected to log and carry on from.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Unavailable { .. } | Error::Rejected { .. } | Error::Validation(_)
        )
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::Unavailable { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unavailable { host, reason } => {
                write!(f, "thermostat {host} unavailable: {reason}")
            }
            Error::Rejected { reason } => write!(f, "thermostat rejected request: {reason}"),
            Error::Validation(v) => write!(f, "command refused: {v}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::UnknownNode(addr) => write!(f, "unknown node: {addr}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

impl From<ValidationFailure> for Error {
    fn from(v: ValidationFailure) -> Self {
        Error::Validation(v)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
