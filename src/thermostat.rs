use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::command::{self, Command, Step};
use crate::config::{ConfigStore, DeviceRecord, SensorRecord};
use crate::diff::{driver_events, merge_drivers};
use crate::discovery::sensor_address;
use crate::protocol::SPACE_TEMP_SENSOR;
use crate::session::DeviceSession;
use crate::translate::{
    poll_from, sensor_drivers, thermostat_drivers, translate_alerts, translate_info,
    translate_sensors, Poll,
};
use crate::types::*;
use crate::{Error, Result};

pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Remote temperature sensor hanging off a thermostat node.
#[derive(Debug, Clone)]
pub struct SensorNode {
    pub address: String,
    pub name: String,
    pub unit: TempUnit,
    pub reading: Option<SensorReading>,
    reported: Vec<DriverValue>,
}

impl SensorNode {
    pub fn drivers(&self) -> &[DriverValue] {
        &self.reported
    }
}

/// One physical thermostat: its session, last known state and child sensors.
pub struct Thermostat {
    address: String,
    identity: DeviceIdentity,
    unit: TempUnit,
    session: DeviceSession,
    store: ConfigStore,
    state: Option<DeviceState>,
    online: bool,
    alerts: Alerts,
    sensors: Vec<SensorNode>,
    reported: Vec<DriverValue>,
    listeners: Vec<EventCallback>,
}

impl Thermostat {
    pub fn new(
        address: impl Into<String>,
        identity: DeviceIdentity,
        unit: TempUnit,
        session: DeviceSession,
        store: ConfigStore,
    ) -> Self {
        let thermostat = Self {
            address: address.into(),
            identity,
            unit,
            session,
            store,
            state: None,
            online: false,
            alerts: Alerts::default(),
            sensors: Vec::new(),
            reported: Vec::new(),
            listeners: Vec::new(),
        };
        thermostat.save_properties();
        thermostat
    }

    pub fn on_event(&mut self, f: impl Fn(&Event) + Send + Sync + 'static) {
        self.listeners.push(Arc::new(f));
    }

    pub(crate) fn add_listener(&mut self, cb: EventCallback) {
        self.listeners.push(cb);
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn temp_unit(&self) -> TempUnit {
        self.unit
    }

    pub fn state(&self) -> Option<&DeviceState> {
        self.state.as_ref()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn sensors(&self) -> &[SensorNode] {
        &self.sensors
    }

    /// Last driver values reported to the host.
    pub fn drivers(&self) -> &[DriverValue] {
        &self.reported
    }

    /// Register the remote sensors from a device roster. The synthetic
    /// "Space Temp" entry is skipped and does not consume a sequence number.
    /// Returns how many sensors were new.
    pub fn register_sensors<'a>(&mut self, roster: impl IntoIterator<Item = &'a str>) -> usize {
        let remote = roster.into_iter().filter(|name| *name != SPACE_TEMP_SENSOR);
        let mut added = 0;
        for (seq, name) in remote.enumerate() {
            if self.register_sensor(seq, name) {
                added += 1;
            }
        }
        added
    }

    /// Register one child sensor at `seq`. Returns false if the address
    /// already exists or the entry duplicates the thermostat's own reading.
    pub fn register_sensor(&mut self, seq: usize, name: &str) -> bool {
        if name == SPACE_TEMP_SENSOR {
            return false;
        }
        let address = sensor_address(&self.address, seq);
        if !self.add_sensor(address.clone(), name) {
            return false;
        }
        self.store.set_sensor_record(
            &address,
            &SensorRecord {
                parent: self.address.clone(),
                name: name.to_string(),
            },
        );
        true
    }

    /// Re-attach a sensor persisted under `address`.
    pub fn restore_sensor(&mut self, address: &str, name: &str) -> bool {
        self.add_sensor(address.to_string(), name)
    }

    fn add_sensor(&mut self, address: String, name: &str) -> bool {
        if self.sensors.iter().any(|s| s.address == address) {
            return false;
        }
        debug!(parent = %self.address, %address, name, "registered sensor");
        self.sensors.push(SensorNode {
            address,
            name: name.to_string(),
            unit: self.unit,
            reading: None,
            reported: Vec::new(),
        });
        true
    }

    /// Short poll: fetch and normalize live state, then report drivers.
    pub async fn refresh(&mut self, force: bool) -> Result<bool> {
        let fetched = self.session.fetch_info().await;
        match poll_from(fetched, self.alerts)? {
            Poll::Online(state) => self.apply_state(state),
            Poll::Offline => self.online = false,
        }
        self.report(force);
        Ok(self.online)
    }

    /// Long poll: alerts and remote sensors. Unavailable endpoints are skipped.
    pub async fn refresh_sensors_and_alerts(&mut self, force: bool) -> Result<()> {
        match self.session.fetch_alerts().await {
            Ok(payload) => {
                self.alerts = translate_alerts(&payload);
                if let Some(state) = self.state.as_mut() {
                    state.alerts = self.alerts;
                }
            }
            Err(e) if e.is_unavailable() => {}
            Err(e) => return Err(e),
        }

        match self.session.fetch_sensors().await {
            Ok(payload) => {
                let readings = translate_sensors(&payload);
                for sensor in &mut self.sensors {
                    // TODO: match on a stable sensor index once the API exposes one;
                    // renamed sensors detach here.
                    if let Some(reading) = readings.iter().find(|r| r.name == sensor.name) {
                        sensor.reading = Some(reading.clone());
                    }
                }
            }
            Err(e) if e.is_unavailable() => {}
            Err(e) => return Err(e),
        }

        self.report(force);
        self.report_sensors(force);
        Ok(())
    }

    /// Validate `command` against freshly fetched state and send it.
    pub async fn execute(&mut self, command: Command) -> Result<()> {
        info!(address = %self.address, command = command.name(), "handling command");

        let info = match self.session.fetch_info().await {
            Ok(info) => info,
            Err(e) => {
                if e.is_unavailable() {
                    self.online = false;
                    self.report(false);
                }
                return Err(e);
            }
        };
        let current = translate_info(&info, self.alerts)?;
        let planned = command::plan(&current, &command);
        self.apply_state(current);

        let plan = match planned {
            Ok(plan) => plan,
            Err(failure) => {
                warn!(
                    address = %self.address,
                    command = command.name(),
                    %failure,
                    "command not sent"
                );
                self.report(false);
                return Err(Error::Validation(failure));
            }
        };

        for step in &plan.steps {
            let sent = match step {
                Step::Setting(setting) => self.session.post_setting(*setting).await,
                Step::Control(request) => self.session.post_control(request).await,
            };
            if let Err(e) = sent {
                match &e {
                    Error::Rejected { reason } => {
                        error!(
                            address = %self.address,
                            command = command.name(),
                            %reason,
                            "thermostat rejected command"
                        )
                    }
                    Error::Unavailable { .. } => {
                        warn!(
                            address = %self.address,
                            command = command.name(),
                            "thermostat unavailable, command aborted"
                        )
                    }
                    _ => {}
                }
                self.report(false);
                return Err(e);
            }
        }

        if let Some(state) = self.state.as_mut() {
            plan.delta.apply(state);
        }
        self.report(false);
        Ok(())
    }

    /// Close the session and report the node offline.
    pub fn disconnect(&mut self) {
        self.session.close();
        self.online = false;
        self.report(true);
    }

    /// Switch the node and its sensors to `unit` and persist it.
    pub fn change_temp_unit(&mut self, unit: TempUnit) {
        if unit == self.unit {
            return;
        }
        info!(address = %self.address, %unit, "temperature unit changed");
        self.unit = unit;
        self.emit(&Event::TempUnitChanged {
            address: self.address.clone(),
            unit,
        });
        let mut events = Vec::with_capacity(self.sensors.len());
        for sensor in &mut self.sensors {
            sensor.unit = unit;
            events.push(Event::TempUnitChanged {
                address: sensor.address.clone(),
                unit,
            });
        }
        for event in &events {
            self.emit(event);
        }
        self.save_properties();
    }

    fn apply_state(&mut self, state: DeviceState) {
        if state.temp_unit != self.unit {
            self.change_temp_unit(state.temp_unit);
        }
        self.online = true;
        self.state = Some(state);
    }

    fn report(&mut self, force: bool) {
        let drivers = thermostat_drivers(self.state.as_ref(), self.online, self.unit);
        let events = driver_events(&self.address, &self.reported, &drivers, force);
        merge_drivers(&mut self.reported, &drivers);
        for event in &events {
            self.emit(event);
        }
    }

    fn report_sensors(&mut self, force: bool) {
        let mut events = Vec::new();
        for sensor in &mut self.sensors {
            let Some(reading) = &sensor.reading else {
                continue;
            };
            let drivers = sensor_drivers(reading, sensor.unit);
            events.extend(driver_events(&sensor.address, &sensor.reported, &drivers, force));
            merge_drivers(&mut sensor.reported, &drivers);
        }
        for event in &events {
            self.emit(event);
        }
    }

    fn emit(&self, event: &Event) {
        for cb in &self.listeners {
            cb(event);
        }
    }

    fn save_properties(&self) {
        self.store.set_device_record(
            &self.address,
            &DeviceRecord {
                hostname: self.identity.hostname.clone(),
                class: self.identity.class,
                temp_unit: self.unit,
                name: Some(self.identity.name.clone()),
            },
        );
    }
}
