//! Raw vendor payloads to the normalized model, and the normalized model to
//! host driver values.

use crate::protocol::{
    alert_active, AlertsPayload, InfoPayload, RawAlert, SensorsPayload, ALERT_AIR_FILTER,
    ALERT_SERVICE, ALERT_UV_LAMP,
};
use crate::types::*;
use crate::{Error, Result};

/// Outcome of a state poll. Offline is distinct from an idle snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Poll {
    Online(DeviceState),
    Offline,
}

impl Poll {
    pub fn is_online(&self) -> bool {
        matches!(self, Poll::Online(_))
    }
}

/// Fold a fetch result into a [`Poll`]. Unavailable becomes Offline; any
/// other failure propagates.
pub fn poll_from(fetched: Result<InfoPayload>, known_alerts: Alerts) -> Result<Poll> {
    match fetched {
        Ok(info) => Ok(Poll::Online(translate_info(&info, known_alerts)?)),
        Err(Error::Unavailable { .. }) => Ok(Poll::Offline),
        Err(e) => Err(e),
    }
}

/// Build a [`DeviceState`] from an info payload. Alerts embedded in the
/// payload win over `known_alerts` from the alerts endpoint.
pub fn translate_info(info: &InfoPayload, known_alerts: Alerts) -> Result<DeviceState> {
    let mode = ThermostatMode::from_raw(info.mode)
        .ok_or_else(|| Error::Protocol(format!("unknown thermostat mode {}", info.mode)))?;
    let fan = FanMode::from_raw(info.fan)
        .ok_or_else(|| Error::Protocol(format!("unknown fan mode {}", info.fan)))?;

    let limits = match (info.heattempmin, info.heattempmax, info.cooltempmin, info.cooltempmax) {
        (Some(heat_min), Some(heat_max), Some(cool_min), Some(cool_max)) => Some(SetpointLimits {
            heat_min,
            heat_max,
            cool_min,
            cool_max,
        }),
        _ => None,
    };

    let alerts = match &info.alerts {
        Some(embedded) => alerts_from(embedded),
        None => known_alerts,
    };

    Ok(DeviceState {
        name: info.name.clone(),
        space_temp: info.spacetemp,
        heat_setpoint: info.heattemp,
        cool_setpoint: info.cooltemp,
        mode,
        fan,
        fan_running: info.fanstate != 0,
        heat_cool: HeatCoolState::from_raw(info.state),
        humidity: info.hum,
        schedule_enabled: info.schedule != 0,
        schedule_phase: SchedulePhase::from_raw(info.schedulepart),
        away: info.away != 0,
        temp_unit: TempUnit::from_raw(info.tempunits),
        setpoint_delta: info.setpointdelta,
        limits,
        hum_setpoint: info.hum_setpoint,
        dehum_setpoint: info.dehum_setpoint,
        alerts,
    })
}

pub fn alerts_from(alerts: &[RawAlert]) -> Alerts {
    Alerts {
        air_filter: alert_active(alerts, ALERT_AIR_FILTER),
        uv_lamp: alert_active(alerts, ALERT_UV_LAMP),
        service: alert_active(alerts, ALERT_SERVICE),
    }
}

pub fn translate_alerts(payload: &AlertsPayload) -> Alerts {
    alerts_from(&payload.alerts)
}

pub fn translate_sensors(payload: &SensorsPayload) -> Vec<SensorReading> {
    payload
        .sensors
        .iter()
        .map(|s| SensorReading {
            name: s.name.clone(),
            temperature: s.temp.unwrap_or(0.0),
            battery: s.battery,
        })
        .collect()
}

/// Driver values for a thermostat node. Offline nodes report only GV0.
pub fn thermostat_drivers(
    state: Option<&DeviceState>,
    online: bool,
    unit: TempUnit,
) -> Vec<DriverValue> {
    let mut drivers = vec![DriverValue::new(Driver::Online, online as u8, Uom::Boolean)];
    let Some(state) = state.filter(|_| online) else {
        return drivers;
    };
    let temp_uom = unit.uom();
    drivers.extend([
        DriverValue::new(Driver::Temperature, state.space_temp, temp_uom),
        DriverValue::new(Driver::HeatSetpoint, state.heat_setpoint, temp_uom),
        DriverValue::new(Driver::CoolSetpoint, state.cool_setpoint, temp_uom),
        DriverValue::new(Driver::Humidity, state.humidity, Uom::RelativeHumidity),
        DriverValue::new(Driver::Mode, state.reported_mode().index(), Uom::ThermostatMode),
        DriverValue::new(Driver::FanMode, state.fan.as_raw(), Uom::FanMode),
        DriverValue::new(Driver::HeatCoolState, state.heat_cool.index(), Uom::HeatCoolState),
        DriverValue::new(Driver::FanRunning, state.fan_running as u8, Uom::FanRunState),
        DriverValue::new(Driver::ScheduleMode, state.schedule_phase.raw(), Uom::Index),
        DriverValue::new(Driver::Away, state.away as u8, Uom::Boolean),
    ]);
    drivers.extend(alert_drivers(&state.alerts));
    drivers
}

pub fn alert_drivers(alerts: &Alerts) -> [DriverValue; 3] {
    [
        DriverValue::new(Driver::FilterAlert, alerts.air_filter as u8, Uom::Index),
        DriverValue::new(Driver::UvLampAlert, alerts.uv_lamp as u8, Uom::Index),
        DriverValue::new(Driver::ServiceAlert, alerts.service as u8, Uom::Index),
    ]
}

pub fn sensor_drivers(reading: &SensorReading, unit: TempUnit) -> Vec<DriverValue> {
    vec![
        DriverValue::new(Driver::Temperature, reading.temperature, unit.uom()),
        DriverValue::new(Driver::BatteryLevel, reading.battery.unwrap_or(0), Uom::Percent),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(extra: serde_json::Value) -> InfoPayload {
        let mut base = json!({
            "name": "Hall", "mode": 3, "state": 0, "fan": 0, "fanstate": 0,
            "tempunits": 0, "schedule": 1, "schedulepart": 1, "away": 0,
            "spacetemp": 71.0, "heattemp": 68.0, "cooltemp": 74.0,
            "setpointdelta": 2.0, "hum": 40.0
        });
        if let (Some(b), Some(e)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in e {
                b.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn heat_cool_index_shifts_extended_states() {
        for raw in 0u8..=20 {
            let idx = HeatCoolState::from_raw(raw).index();
            if raw <= 2 {
                assert_eq!(idx, raw as u16);
            } else {
                assert_eq!(idx, raw as u16 + 10);
            }
        }
    }

    #[test]
    fn auto_mode_passes_through() {
        let state = translate_info(&info(json!({})), Alerts::default()).unwrap();
        assert_eq!(state.reported_mode().index(), 3);
        assert_eq!(state.heat_setpoint, 68.0);
        assert_eq!(state.cool_setpoint, 74.0);
    }

    #[test]
    fn away_forces_sentinel_but_keeps_mode() {
        let state = translate_info(&info(json!({"away": 1})), Alerts::default()).unwrap();
        assert_eq!(state.reported_mode(), ReportedMode::Away);
        assert_eq!(state.reported_mode().index(), 13);
        assert_eq!(state.mode, ThermostatMode::Auto);
    }

    #[test]
    fn schedule_part_passes_through() {
        let state = translate_info(&info(json!({"schedulepart": 255})), Alerts::default()).unwrap();
        assert_eq!(state.schedule_phase, SchedulePhase::INACTIVE);
        assert!(!state.schedule_phase.is_active());
        let state = translate_info(&info(json!({"schedulepart": 2})), Alerts::default()).unwrap();
        assert_eq!(state.schedule_phase.raw(), 2);
    }

    #[test]
    fn embedded_alerts_override_known() {
        let known = Alerts {
            air_filter: true,
            ..Default::default()
        };
        let state = translate_info(&info(json!({})), known).unwrap();
        assert!(state.alerts.air_filter);

        let embedded = json!({"alerts": [{"name": "Service", "active": true}]});
        let state = translate_info(&info(embedded), known).unwrap();
        assert!(!state.alerts.air_filter);
        assert!(state.alerts.service);
    }

    #[test]
    fn unknown_mode_is_protocol_error() {
        let err = translate_info(&info(json!({"mode": 9})), Alerts::default()).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn unavailable_becomes_offline() {
        let fetched = Err(Error::Unavailable {
            host: "h".into(),
            reason: "timed out".into(),
        });
        assert_eq!(poll_from(fetched, Alerts::default()).unwrap(), Poll::Offline);

        let fetched = Err(Error::Protocol("garbage".into()));
        assert!(poll_from(fetched, Alerts::default()).is_err());
    }

    #[test]
    fn offline_reports_only_online_flag() {
        let state = translate_info(&info(json!({})), Alerts::default()).unwrap();
        let drivers = thermostat_drivers(Some(&state), false, TempUnit::Fahrenheit);
        assert_eq!(drivers, vec![DriverValue::new(Driver::Online, 0u8, Uom::Boolean)]);
    }

    #[test]
    fn drivers_use_unit_uom() {
        let state = translate_info(&info(json!({"tempunits": 1})), Alerts::default()).unwrap();
        let drivers = thermostat_drivers(Some(&state), true, TempUnit::Celsius);
        let st = drivers.iter().find(|d| d.driver == Driver::Temperature).unwrap();
        assert_eq!(st.uom, Uom::Celsius);
        let mode = drivers.iter().find(|d| d.driver == Driver::Mode).unwrap();
        assert_eq!(mode.value, 3.0);
    }
}
