use std::fmt;

/// Temperature unit the thermostat displays and accepts setpoints in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempUnit {
    #[default]
    Fahrenheit,
    Celsius,
}

impl TempUnit {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => TempUnit::Celsius,
            _ => TempUnit::Fahrenheit,
        }
    }

    pub fn as_raw(&self) -> u8 {
        match self {
            TempUnit::Fahrenheit => 0,
            TempUnit::Celsius => 1,
        }
    }

    pub fn uom(&self) -> Uom {
        match self {
            TempUnit::Fahrenheit => Uom::Fahrenheit,
            TempUnit::Celsius => Uom::Celsius,
        }
    }
}

impl fmt::Display for TempUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TempUnit::Fahrenheit => write!(f, "\u{00b0}F"),
            TempUnit::Celsius => write!(f, "\u{00b0}C"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Residential,
    Commercial,
}

impl DeviceClass {
    pub fn as_vendor_str(&self) -> &'static str {
        match self {
            DeviceClass::Residential => "residential",
            DeviceClass::Commercial => "commercial",
        }
    }

    pub fn from_vendor_str(s: &str) -> Option<Self> {
        match s {
            "residential" => Some(DeviceClass::Residential),
            "commercial" => Some(DeviceClass::Commercial),
            _ => None,
        }
    }
}

/// Operating mode as stored by the device. Away is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThermostatMode {
    #[default]
    Off,
    Heat,
    Cool,
    Auto,
}

impl ThermostatMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ThermostatMode::Off),
            1 => Some(ThermostatMode::Heat),
            2 => Some(ThermostatMode::Cool),
            3 => Some(ThermostatMode::Auto),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> u8 {
        match self {
            ThermostatMode::Off => 0,
            ThermostatMode::Heat => 1,
            ThermostatMode::Cool => 2,
            ThermostatMode::Auto => 3,
        }
    }

    pub fn heats(&self) -> bool {
        matches!(self, ThermostatMode::Heat | ThermostatMode::Auto)
    }

    pub fn cools(&self) -> bool {
        matches!(self, ThermostatMode::Cool | ThermostatMode::Auto)
    }
}

/// Mode as surfaced to the host; Away overrides whatever the device mode is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedMode {
    Off,
    Heat,
    Cool,
    Auto,
    Away,
}

impl ReportedMode {
    pub const AWAY_INDEX: u8 = 13;

    pub fn index(&self) -> u8 {
        match self {
            ReportedMode::Off => 0,
            ReportedMode::Heat => 1,
            ReportedMode::Cool => 2,
            ReportedMode::Auto => 3,
            ReportedMode::Away => Self::AWAY_INDEX,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(ReportedMode::Off),
            1 => Some(ReportedMode::Heat),
            2 => Some(ReportedMode::Cool),
            3 => Some(ReportedMode::Auto),
            Self::AWAY_INDEX => Some(ReportedMode::Away),
            _ => None,
        }
    }

    /// The device mode this maps to, or None for Away.
    pub fn device_mode(&self) -> Option<ThermostatMode> {
        match self {
            ReportedMode::Off => Some(ThermostatMode::Off),
            ReportedMode::Heat => Some(ThermostatMode::Heat),
            ReportedMode::Cool => Some(ThermostatMode::Cool),
            ReportedMode::Auto => Some(ThermostatMode::Auto),
            ReportedMode::Away => None,
        }
    }
}

impl From<ThermostatMode> for ReportedMode {
    fn from(mode: ThermostatMode) -> Self {
        match mode {
            ThermostatMode::Off => ReportedMode::Off,
            ThermostatMode::Heat => ReportedMode::Heat,
            ThermostatMode::Cool => ReportedMode::Cool,
            ThermostatMode::Auto => ReportedMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanMode {
    #[default]
    Auto,
    On,
}

impl FanMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(FanMode::Auto),
            1 => Some(FanMode::On),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> u8 {
        match self {
            FanMode::Auto => 0,
            FanMode::On => 1,
        }
    }
}

/// Equipment running state. Values past Cooling are device-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeatCoolState {
    #[default]
    Idle,
    Heating,
    Cooling,
    Lockout,
    AuxHeat,
    Other(u8),
}

impl HeatCoolState {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => HeatCoolState::Idle,
            1 => HeatCoolState::Heating,
            2 => HeatCoolState::Cooling,
            3 => HeatCoolState::Lockout,
            4 => HeatCoolState::AuxHeat,
            n => HeatCoolState::Other(n),
        }
    }

    pub fn raw(&self) -> u8 {
        match self {
            HeatCoolState::Idle => 0,
            HeatCoolState::Heating => 1,
            HeatCoolState::Cooling => 2,
            HeatCoolState::Lockout => 3,
            HeatCoolState::AuxHeat => 4,
            HeatCoolState::Other(n) => *n,
        }
    }

    /// Host index: base states pass through, extended states shift by 10.
    pub fn index(&self) -> u16 {
        let raw = self.raw() as u16;
        if raw <= 2 { raw } else { raw + 10 }
    }
}

/// Raw schedule part reported by the device; 255 means no schedule running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePhase(u8);

impl SchedulePhase {
    pub const INACTIVE: SchedulePhase = SchedulePhase(255);

    pub fn from_raw(raw: u8) -> Self {
        SchedulePhase(raw)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }

    pub fn is_active(&self) -> bool {
        *self != Self::INACTIVE
    }
}

impl Default for SchedulePhase {
    fn default() -> Self {
        Self::INACTIVE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Alerts {
    pub air_filter: bool,
    pub uv_lamp: bool,
    pub service: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointLimits {
    pub heat_min: f64,
    pub heat_max: f64,
    pub cool_min: f64,
    pub cool_max: f64,
}

/// Normalized thermostat snapshot. Produced by the translator; patched by
/// [`StateDelta`](crate::command::StateDelta) after a successful write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceState {
    pub name: String,
    pub space_temp: f64,
    pub heat_setpoint: f64,
    pub cool_setpoint: f64,
    pub mode: ThermostatMode,
    pub fan: FanMode,
    pub fan_running: bool,
    pub heat_cool: HeatCoolState,
    pub humidity: f64,
    pub schedule_enabled: bool,
    pub schedule_phase: SchedulePhase,
    pub away: bool,
    pub temp_unit: TempUnit,
    pub setpoint_delta: f64,
    pub limits: Option<SetpointLimits>,
    pub hum_setpoint: Option<u8>,
    pub dehum_setpoint: Option<u8>,
    pub alerts: Alerts,
}

impl DeviceState {
    pub fn reported_mode(&self) -> ReportedMode {
        if self.away {
            ReportedMode::Away
        } else {
            self.mode.into()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    pub id: String,
    pub name: String,
    pub class: DeviceClass,
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub name: String,
    pub temperature: f64,
    pub battery: Option<u8>,
}

/// Units of measure attached to driver values on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uom {
    Boolean,
    Celsius,
    Fahrenheit,
    RelativeHumidity,
    Index,
    Percent,
    HeatCoolState,
    ThermostatMode,
    FanMode,
    FanRunState,
}

impl Uom {
    pub fn code(&self) -> u16 {
        match self {
            Uom::Boolean => 2,
            Uom::Celsius => 4,
            Uom::Fahrenheit => 17,
            Uom::RelativeHumidity => 22,
            Uom::Index => 25,
            Uom::Percent => 51,
            Uom::HeatCoolState => 66,
            Uom::ThermostatMode => 67,
            Uom::FanMode => 68,
            Uom::FanRunState => 80,
        }
    }
}

/// Named values a node exposes to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Driver {
    Temperature,
    HeatSetpoint,
    CoolSetpoint,
    Mode,
    FanMode,
    Humidity,
    HeatCoolState,
    FanRunning,
    ScheduleMode,
    Online,
    Away,
    FilterAlert,
    UvLampAlert,
    ServiceAlert,
    BatteryLevel,
}

impl Driver {
    pub fn code(&self) -> &'static str {
        match self {
            Driver::Temperature => "ST",
            Driver::HeatSetpoint => "CLISPH",
            Driver::CoolSetpoint => "CLISPC",
            Driver::Mode => "CLIMD",
            Driver::FanMode => "CLIFS",
            Driver::Humidity => "CLIHUM",
            Driver::HeatCoolState => "CLIHCS",
            Driver::FanRunning => "CLIFRS",
            Driver::ScheduleMode => "CLISMD",
            Driver::Online => "GV0",
            Driver::Away => "GV1",
            Driver::FilterAlert => "GV11",
            Driver::UvLampAlert => "GV12",
            Driver::ServiceAlert => "GV13",
            Driver::BatteryLevel => "BATLVL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverValue {
    pub driver: Driver,
    pub value: f64,
    pub uom: Uom,
}

impl DriverValue {
    pub fn new(driver: Driver, value: impl Into<f64>, uom: Uom) -> Self {
        Self {
            driver,
            value: value.into(),
            uom,
        }
    }
}

/// User-visible discovery outcome, distinct from per-poll log warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Unresolved { host: String },
    Unsupported { host: String, class: String },
    ProbeFailed { host: String, reason: String },
    SearchFailed { reason: String },
    NothingFound,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Unresolved { host } => write!(f, "Unable to resolve address for {host}"),
            Notice::Unsupported { host, class } => {
                write!(f, "Thermostat at {host} is a {class} model, which is not supported")
            }
            Notice::ProbeFailed { host, reason } => {
                write!(f, "Thermostat at {host} did not answer the info query: {reason}")
            }
            Notice::SearchFailed { reason } => {
                write!(f, "Network search for thermostats failed: {reason}")
            }
            Notice::NothingFound => write!(f, "No thermostats found"),
        }
    }
}

/// Events emitted towards the host when node values change.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DriverChanged { address: String, driver: Driver, value: f64, uom: Uom },
    TempUnitChanged { address: String, unit: TempUnit },
}
