//! Host commands and the rules that decide whether, and how, they reach the
//! thermostat. Planning is pure; [`Thermostat::execute`](crate::Thermostat::execute)
//! performs the resulting steps.

use crate::error::ValidationFailure;
use crate::protocol::{ControlRequest, Setting};
use crate::types::*;

const HUMIDIFY_RANGE: (u8, u8) = (0, 60);
const DEHUMIDIFY_RANGE: (u8, u8) = (25, 99);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn delta(&self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Raise or lower the active setpoint(s) by one degree.
    StepSetpoint(Direction),
    SetHeatSetpoint(f64),
    SetCoolSetpoint(f64),
    SetMode(ReportedMode),
    SetFanMode(FanMode),
    SetAway(bool),
    SetSchedule(bool),
    SetTempUnits(TempUnit),
    SetHumidifySetpoint(u8),
    SetDehumidifySetpoint(u8),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::StepSetpoint(Direction::Up) => "raise_setpoint",
            Command::StepSetpoint(Direction::Down) => "lower_setpoint",
            Command::SetHeatSetpoint(_) => "set_heat_setpoint",
            Command::SetCoolSetpoint(_) => "set_cool_setpoint",
            Command::SetMode(_) => "set_mode",
            Command::SetFanMode(_) => "set_fan_mode",
            Command::SetAway(_) => "set_away",
            Command::SetSchedule(_) => "set_schedule",
            Command::SetTempUnits(_) => "set_temp_units",
            Command::SetHumidifySetpoint(_) => "set_humidify_setpoint",
            Command::SetDehumidifySetpoint(_) => "set_dehumidify_setpoint",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Setting(Setting),
    Control(ControlRequest),
}

/// Fields to patch into the cached state once every step has succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub heat_setpoint: Option<f64>,
    pub cool_setpoint: Option<f64>,
    pub mode: Option<ThermostatMode>,
    pub fan: Option<FanMode>,
    pub away: Option<bool>,
    pub schedule_enabled: Option<bool>,
    pub schedule_phase: Option<SchedulePhase>,
    pub temp_unit: Option<TempUnit>,
    pub hum_setpoint: Option<u8>,
    pub dehum_setpoint: Option<u8>,
}

impl StateDelta {
    pub fn apply(&self, state: &mut DeviceState) {
        if let Some(v) = self.heat_setpoint {
            state.heat_setpoint = v;
        }
        if let Some(v) = self.cool_setpoint {
            state.cool_setpoint = v;
        }
        if let Some(v) = self.mode {
            state.mode = v;
        }
        if let Some(v) = self.fan {
            state.fan = v;
        }
        if let Some(v) = self.away {
            state.away = v;
        }
        if let Some(v) = self.schedule_enabled {
            state.schedule_enabled = v;
        }
        if let Some(v) = self.schedule_phase {
            state.schedule_phase = v;
        }
        if let Some(v) = self.temp_unit {
            state.temp_unit = v;
        }
        if let Some(v) = self.hum_setpoint {
            state.hum_setpoint = Some(v);
        }
        if let Some(v) = self.dehum_setpoint {
            state.dehum_setpoint = Some(v);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub delta: StateDelta,
}

/// Decide what `command` does against `state`. An `Err` means nothing may be
/// sent to the device.
pub fn plan(state: &DeviceState, command: &Command) -> Result<Plan, ValidationFailure> {
    match *command {
        Command::StepSetpoint(direction) => {
            if state.away {
                return Err(ValidationFailure::AwayActive);
            }
            if state.mode == ThermostatMode::Off {
                return Err(ValidationFailure::ModeOff);
            }
            let mut heat = state.heat_setpoint;
            let mut cool = state.cool_setpoint;
            if state.mode.heats() {
                heat += direction.delta();
                check_heat_limit(state, heat)?;
            }
            if state.mode.cools() {
                cool += direction.delta();
                check_cool_limit(state, cool)?;
            }
            Ok(setpoints_plan(heat, cool))
        }
        Command::SetHeatSetpoint(heat) => {
            if state.away {
                return Err(ValidationFailure::AwayActive);
            }
            check_heat_limit(state, heat)?;
            check_separation(state, state.mode, heat, state.cool_setpoint)?;
            Ok(setpoints_plan(heat, state.cool_setpoint))
        }
        Command::SetCoolSetpoint(cool) => {
            if state.away {
                return Err(ValidationFailure::AwayActive);
            }
            check_cool_limit(state, cool)?;
            check_separation(state, state.mode, state.heat_setpoint, cool)?;
            Ok(setpoints_plan(state.heat_setpoint, cool))
        }
        Command::SetMode(mode) => match mode.device_mode() {
            None => Ok(away_plan(true)),
            Some(mode) => {
                check_separation(state, mode, state.heat_setpoint, state.cool_setpoint)?;
                let mut steps = Vec::new();
                if state.away {
                    steps.push(Step::Setting(Setting::Away(false)));
                }
                steps.push(Step::Control(ControlRequest::mode(
                    mode.as_raw(),
                    state.heat_setpoint,
                    state.cool_setpoint,
                )));
                Ok(Plan {
                    steps,
                    delta: StateDelta {
                        mode: Some(mode),
                        away: Some(false),
                        ..Default::default()
                    },
                })
            }
        },
        Command::SetFanMode(fan) => {
            if state.away {
                return Err(ValidationFailure::AwayActive);
            }
            Ok(Plan {
                steps: vec![Step::Control(ControlRequest::fan(fan.as_raw()))],
                delta: StateDelta {
                    fan: Some(fan),
                    ..Default::default()
                },
            })
        }
        Command::SetAway(away) => Ok(away_plan(away)),
        Command::SetSchedule(on) => {
            if state.away {
                return Err(ValidationFailure::AwayActive);
            }
            // Turning the schedule on lands in a phase only the device knows.
            Ok(Plan {
                steps: vec![Step::Setting(Setting::Schedule(on))],
                delta: StateDelta {
                    schedule_enabled: Some(on),
                    schedule_phase: (!on).then_some(SchedulePhase::INACTIVE),
                    ..Default::default()
                },
            })
        }
        Command::SetTempUnits(unit) => Ok(Plan {
            steps: vec![Step::Setting(Setting::TempUnits(unit))],
            delta: StateDelta {
                temp_unit: Some(unit),
                ..Default::default()
            },
        }),
        Command::SetHumidifySetpoint(value) => {
            check_setting_range("hum_setpoint", value, HUMIDIFY_RANGE)?;
            Ok(Plan {
                steps: vec![Step::Setting(Setting::HumidifySetpoint(value))],
                delta: StateDelta {
                    hum_setpoint: Some(value),
                    ..Default::default()
                },
            })
        }
        Command::SetDehumidifySetpoint(value) => {
            check_setting_range("dehum_setpoint", value, DEHUMIDIFY_RANGE)?;
            Ok(Plan {
                steps: vec![Step::Setting(Setting::DehumidifySetpoint(value))],
                delta: StateDelta {
                    dehum_setpoint: Some(value),
                    ..Default::default()
                },
            })
        }
    }
}

fn setpoints_plan(heat: f64, cool: f64) -> Plan {
    Plan {
        steps: vec![Step::Control(ControlRequest::setpoints(heat, cool))],
        delta: StateDelta {
            heat_setpoint: Some(heat),
            cool_setpoint: Some(cool),
            ..Default::default()
        },
    }
}

fn away_plan(away: bool) -> Plan {
    Plan {
        steps: vec![Step::Setting(Setting::Away(away))],
        delta: StateDelta {
            away: Some(away),
            ..Default::default()
        },
    }
}

fn check_separation(
    state: &DeviceState,
    mode: ThermostatMode,
    heat: f64,
    cool: f64,
) -> Result<(), ValidationFailure> {
    if mode == ThermostatMode::Auto && cool - heat < state.setpoint_delta {
        return Err(ValidationFailure::SetpointSeparation {
            heat,
            cool,
            min_separation: state.setpoint_delta,
        });
    }
    Ok(())
}

fn check_heat_limit(state: &DeviceState, heat: f64) -> Result<(), ValidationFailure> {
    match state.limits {
        Some(l) => check_range(heat, l.heat_min, l.heat_max),
        None => Ok(()),
    }
}

fn check_cool_limit(state: &DeviceState, cool: f64) -> Result<(), ValidationFailure> {
    match state.limits {
        Some(l) => check_range(cool, l.cool_min, l.cool_max),
        None => Ok(()),
    }
}

fn check_range(value: f64, min: f64, max: f64) -> Result<(), ValidationFailure> {
    if value < min || value > max {
        return Err(ValidationFailure::SetpointOutOfRange { value, min, max });
    }
    Ok(())
}

fn check_setting_range(
    setting: &'static str,
    value: u8,
    (min, max): (u8, u8),
) -> Result<(), ValidationFailure> {
    if value < min || value > max {
        return Err(ValidationFailure::SettingOutOfRange {
            setting,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(mode: ThermostatMode, heat: f64, cool: f64) -> DeviceState {
        DeviceState {
            mode,
            heat_setpoint: heat,
            cool_setpoint: cool,
            setpoint_delta: 2.0,
            ..Default::default()
        }
    }

    fn control(plan: &Plan) -> &ControlRequest {
        match plan.steps.last() {
            Some(Step::Control(c)) => c,
            other => panic!("expected control step, got {other:?}"),
        }
    }

    #[test]
    fn step_adjusts_setpoints_by_mode() {
        let up = Command::StepSetpoint(Direction::Up);
        let down = Command::StepSetpoint(Direction::Down);

        let p = plan(&state(ThermostatMode::Heat, 68.0, 74.0), &up).unwrap();
        assert_eq!(control(&p), &ControlRequest::setpoints(69.0, 74.0));

        let p = plan(&state(ThermostatMode::Cool, 68.0, 74.0), &down).unwrap();
        assert_eq!(control(&p), &ControlRequest::setpoints(68.0, 73.0));

        let p = plan(&state(ThermostatMode::Auto, 68.0, 74.0), &up).unwrap();
        assert_eq!(control(&p), &ControlRequest::setpoints(69.0, 75.0));
        assert_eq!(p.delta.heat_setpoint, Some(69.0));
        assert_eq!(p.delta.cool_setpoint, Some(75.0));
    }

    #[test]
    fn step_refused_when_off_or_away() {
        let up = Command::StepSetpoint(Direction::Up);
        assert_eq!(
            plan(&state(ThermostatMode::Off, 68.0, 74.0), &up),
            Err(ValidationFailure::ModeOff)
        );
        let mut away = state(ThermostatMode::Heat, 68.0, 74.0);
        away.away = true;
        assert_eq!(plan(&away, &up), Err(ValidationFailure::AwayActive));
    }

    #[test]
    fn auto_separation_boundary() {
        let s = state(ThermostatMode::Auto, 68.0, 74.0);
        for heat in 60..=80 {
            let heat = heat as f64;
            let result = plan(&s, &Command::SetHeatSetpoint(heat));
            if 74.0 - heat < 2.0 {
                assert!(matches!(result, Err(ValidationFailure::SetpointSeparation { .. })));
            } else {
                let p = result.unwrap();
                assert_eq!(control(&p), &ControlRequest::setpoints(heat, 74.0));
            }
        }
        for cool in 60..=80 {
            let cool = cool as f64;
            let result = plan(&s, &Command::SetCoolSetpoint(cool));
            assert_eq!(result.is_ok(), cool - 68.0 >= 2.0, "cool {cool}");
        }
    }

    #[test]
    fn separation_ignored_outside_auto() {
        let s = state(ThermostatMode::Heat, 68.0, 74.0);
        let p = plan(&s, &Command::SetHeatSetpoint(74.0)).unwrap();
        assert_eq!(control(&p), &ControlRequest::setpoints(74.0, 74.0));
    }

    #[test]
    fn setpoint_set_refused_in_away() {
        let mut s = state(ThermostatMode::Heat, 68.0, 74.0);
        s.away = true;
        assert_eq!(
            plan(&s, &Command::SetCoolSetpoint(76.0)),
            Err(ValidationFailure::AwayActive)
        );
    }

    #[test]
    fn setpoint_limits_enforced() {
        let mut s = state(ThermostatMode::Heat, 68.0, 74.0);
        s.limits = Some(SetpointLimits {
            heat_min: 35.0,
            heat_max: 90.0,
            cool_min: 35.0,
            cool_max: 99.0,
        });
        assert!(matches!(
            plan(&s, &Command::SetHeatSetpoint(95.0)),
            Err(ValidationFailure::SetpointOutOfRange { .. })
        ));
        s.heat_setpoint = 90.0;
        assert!(plan(&s, &Command::StepSetpoint(Direction::Up)).is_err());
    }

    #[test]
    fn away_mode_uses_settings_only() {
        let s = state(ThermostatMode::Cool, 68.0, 74.0);
        let p = plan(&s, &Command::SetMode(ReportedMode::Away)).unwrap();
        assert_eq!(p.steps, vec![Step::Setting(Setting::Away(true))]);
        assert_eq!(p.delta.away, Some(true));
        assert_eq!(p.delta.mode, None);
    }

    #[test]
    fn leaving_away_clears_flag_before_mode() {
        let mut s = state(ThermostatMode::Cool, 68.0, 74.0);
        s.away = true;
        let p = plan(&s, &Command::SetMode(ReportedMode::Heat)).unwrap();
        assert_eq!(
            p.steps,
            vec![
                Step::Setting(Setting::Away(false)),
                Step::Control(ControlRequest::mode(1, 68.0, 74.0)),
            ]
        );

        s.away = false;
        let p = plan(&s, &Command::SetMode(ReportedMode::Heat)).unwrap();
        assert_eq!(p.steps.len(), 1);
    }

    #[test]
    fn away_round_trip_restores_mode() {
        let mut s = state(ThermostatMode::Auto, 68.0, 74.0);
        plan(&s, &Command::SetAway(true)).unwrap().delta.apply(&mut s);
        assert_eq!(s.reported_mode(), ReportedMode::Away);
        assert_eq!(s.mode, ThermostatMode::Auto);
        plan(&s, &Command::SetAway(false)).unwrap().delta.apply(&mut s);
        assert_eq!(s.reported_mode(), ReportedMode::Auto);
    }

    #[test]
    fn fan_refused_in_away() {
        let mut s = state(ThermostatMode::Cool, 68.0, 74.0);
        assert!(plan(&s, &Command::SetFanMode(FanMode::On)).is_ok());
        s.away = true;
        assert_eq!(
            plan(&s, &Command::SetFanMode(FanMode::On)),
            Err(ValidationFailure::AwayActive)
        );
    }

    #[test]
    fn schedule_off_forces_inactive_phase() {
        let s = state(ThermostatMode::Heat, 68.0, 74.0);
        let off = plan(&s, &Command::SetSchedule(false)).unwrap();
        assert_eq!(off.delta.schedule_phase, Some(SchedulePhase::INACTIVE));
        let on = plan(&s, &Command::SetSchedule(true)).unwrap();
        assert_eq!(on.delta.schedule_phase, None);
        assert_eq!(on.steps, vec![Step::Setting(Setting::Schedule(true))]);
    }

    #[test]
    fn humidity_ranges() {
        let s = state(ThermostatMode::Heat, 68.0, 74.0);
        assert!(plan(&s, &Command::SetHumidifySetpoint(60)).is_ok());
        assert!(plan(&s, &Command::SetHumidifySetpoint(61)).is_err());
        assert!(plan(&s, &Command::SetDehumidifySetpoint(24)).is_err());
        assert!(plan(&s, &Command::SetDehumidifySetpoint(99)).is_ok());
    }
}
