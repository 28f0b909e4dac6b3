use std::collections::btree_map::{BTreeMap, Entry};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::config::{ConfigStore, Settings};
use crate::discovery::{derive_node_name, resolve_static, search, thermostat_address, Candidate};
use crate::logger::MessageLogMode;
use crate::protocol::MINIMUM_API_LEVEL;
use crate::session::{probe, DeviceSession, ProbeOutcome};
use crate::thermostat::{EventCallback, Thermostat};
use crate::types::{DeviceClass, DeviceIdentity, Event, Notice, TempUnit};
use crate::{Error, Result};

/// Node addresses touched by one discovery run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DiscoveryReport {
    pub added: Vec<String>,
    pub reused: Vec<String>,
}

/// Registry of thermostat nodes keyed by address.
///
/// Everything runs sequentially: one device at a time, one call at a time.
pub struct Controller {
    settings: Settings,
    store: ConfigStore,
    protocol: String,
    nodes: BTreeMap<String, Thermostat>,
    notices: Vec<Notice>,
    listeners: Vec<EventCallback>,
}

impl Controller {
    pub fn new(settings: Settings, store: ConfigStore) -> Self {
        Self {
            settings,
            store,
            protocol: "http".to_string(),
            nodes: BTreeMap::new(),
            notices: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn protocol(mut self, proto: &str) -> Self {
        self.protocol = proto.to_string();
        self
    }

    /// Receives events from every node, including ones created later.
    pub fn on_event(&mut self, f: impl Fn(&Event) + Send + Sync + 'static) {
        let cb: EventCallback = Arc::new(f);
        for node in self.nodes.values_mut() {
            node.add_listener(cb.clone());
        }
        self.listeners.push(cb);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn node(&self, address: &str) -> Option<&Thermostat> {
        self.nodes.get(address)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Thermostat> {
        self.nodes.values()
    }

    /// Recreate thermostat nodes from their device records, then re-attach
    /// each persisted sensor to its parent.
    pub fn restore(&mut self) -> Result<usize> {
        let mut restored = 0;
        for address in self.store.device_addresses() {
            if self.nodes.contains_key(&address) {
                continue;
            }
            let Some(record) = self.store.device_record(&address) else {
                continue;
            };
            let session = self.open_session(&record.hostname)?;
            let identity = DeviceIdentity {
                id: address.clone(),
                name: record.name.clone().unwrap_or_else(|| address.clone()),
                class: record.class,
                hostname: record.hostname.clone(),
            };
            let node = build_node(
                &self.store,
                &self.listeners,
                &address,
                identity,
                record.temp_unit,
                session,
            );
            self.nodes.insert(address, node);
            restored += 1;
        }

        for address in self.store.sensor_addresses() {
            let Some(record) = self.store.sensor_record(&address) else {
                continue;
            };
            match self.nodes.get_mut(&record.parent) {
                Some(parent) => {
                    parent.restore_sensor(&address, &record.name);
                }
                None => {
                    warn!(%address, parent = %record.parent, "sensor record without thermostat")
                }
            }
        }
        debug!(restored, "restored thermostat nodes");
        Ok(restored)
    }

    /// Find thermostats, register new ones and reuse known ones, then force a
    /// full refresh of every node.
    pub async fn discover(&mut self) -> Result<DiscoveryReport> {
        self.notices.clear();

        let candidates = match self.settings.static_hosts() {
            Some(hosts) => {
                info!(count = hosts.len(), "discovering configured thermostats");
                let (candidates, unresolved) = resolve_static(&hosts).await;
                self.notices
                    .extend(unresolved.into_iter().map(|host| Notice::Unresolved { host }));
                candidates
            }
            None => {
                info!(timeout = ?self.settings.discovery_timeout(), "searching for thermostats");
                match search(self.settings.discovery_timeout()).await {
                    Ok(candidates) if candidates.is_empty() => {
                        self.notices.push(Notice::NothingFound);
                        candidates
                    }
                    Ok(candidates) => candidates,
                    Err(e) => {
                        warn!(error = %e, "thermostat search failed");
                        self.notices.push(Notice::SearchFailed { reason: e.to_string() });
                        Vec::new()
                    }
                }
            }
        };

        let mut report = DiscoveryReport::default();
        for candidate in candidates {
            self.admit(candidate, &mut report).await?;
        }
        self.store.save()?;

        let mut failures = Vec::new();
        for (address, node) in self.nodes.iter_mut() {
            let refreshed = match node.refresh(true).await {
                Ok(_) => node.refresh_sensors_and_alerts(true).await,
                Err(e) => Err(e),
            };
            if let Err(e) = refreshed {
                error!(%address, error = %e, "initial refresh failed");
                failures.push(e);
            }
        }

        info!(
            added = report.added.len(),
            reused = report.reused.len(),
            notices = self.notices.len(),
            "discovery finished"
        );
        first_failure(failures)?;
        Ok(report)
    }

    /// Refresh live state of every node. A failing node does not stop the
    /// others; the first failure is returned once all have been polled.
    pub async fn short_poll(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for (address, node) in self.nodes.iter_mut() {
            if let Err(e) = node.refresh(false).await {
                error!(%address, error = %e, "short poll failed");
                failures.push(e);
            }
        }
        first_failure(failures)
    }

    /// Refresh alerts and remote sensors of every node, then persist the store.
    pub async fn long_poll(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for (address, node) in self.nodes.iter_mut() {
            if let Err(e) = node.refresh_sensors_and_alerts(false).await {
                error!(%address, error = %e, "long poll failed");
                failures.push(e);
            }
        }
        self.store.save()?;
        first_failure(failures)
    }

    pub async fn command(&mut self, address: &str, command: Command) -> Result<()> {
        let node = self
            .nodes
            .get_mut(address)
            .ok_or_else(|| Error::UnknownNode(address.to_string()))?;
        node.execute(command).await
    }

    /// Close every session and report each node offline.
    pub fn shutdown(&mut self) -> Result<()> {
        for node in self.nodes.values_mut() {
            node.disconnect();
        }
        self.store.save()
    }

    async fn admit(&mut self, candidate: Candidate, report: &mut DiscoveryReport) -> Result<()> {
        let mut session = self.open_session(&candidate.hostname)?;
        let found = match probe(&mut session).await {
            Ok(ProbeOutcome::Residential(found)) => found,
            Ok(ProbeOutcome::Unsupported(api)) => {
                warn!(
                    host = %candidate.hostname,
                    class = %api.class,
                    "unsupported thermostat class"
                );
                self.notices.push(Notice::Unsupported {
                    host: candidate.hostname,
                    class: api.class,
                });
                return Ok(());
            }
            Err(e) => {
                warn!(host = %candidate.hostname, error = %e, "thermostat probe failed");
                self.notices.push(Notice::ProbeFailed {
                    host: candidate.hostname,
                    reason: e.to_string(),
                });
                return Ok(());
            }
        };

        if found.api.api_ver < MINIMUM_API_LEVEL {
            warn!(
                host = %candidate.hostname,
                api_ver = found.api.api_ver,
                minimum = MINIMUM_API_LEVEL,
                "thermostat API level is older than supported"
            );
        }

        let address = thermostat_address(&candidate.id);
        let node = match self.nodes.entry(address.clone()) {
            Entry::Occupied(entry) => {
                debug!(%address, host = %candidate.hostname, "thermostat already known");
                report.reused.push(address);
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                let raw_name = candidate
                    .name
                    .filter(|n| !n.is_empty())
                    .or_else(|| Some(found.info.name.clone()).filter(|n| !n.is_empty()))
                    .unwrap_or_else(|| candidate.hostname.clone());
                // A stored record wins over the probe so a restart keeps the cached unit.
                let unit = match self.store.device_record(&address) {
                    Some(record) => record.temp_unit,
                    None => TempUnit::from_raw(found.info.tempunits),
                };
                let identity = DeviceIdentity {
                    id: candidate.id,
                    name: derive_node_name(&raw_name),
                    class: DeviceClass::Residential,
                    hostname: candidate.hostname,
                };
                info!(
                    %address,
                    name = %identity.name,
                    host = %identity.hostname,
                    "adding thermostat"
                );
                let node =
                    build_node(&self.store, &self.listeners, &address, identity, unit, session);
                report.added.push(address);
                entry.insert(node)
            }
        };

        node.register_sensors(found.sensors.iter().map(|s| s.name.as_str()));
        Ok(())
    }

    fn open_session(&self, host: &str) -> Result<DeviceSession> {
        let mut builder = DeviceSession::builder(host)
            .protocol(&self.protocol)
            .pin(self.settings.pin.clone());
        if let Some(path) = &self.settings.message_log {
            builder = builder.message_log(MessageLogMode::Diffed, path.to_string_lossy());
        }
        builder.build()
    }
}

fn build_node(
    store: &ConfigStore,
    listeners: &[EventCallback],
    address: &str,
    identity: DeviceIdentity,
    unit: TempUnit,
    session: DeviceSession,
) -> Thermostat {
    let mut node = Thermostat::new(address, identity, unit, session, store.clone());
    for cb in listeners {
        node.add_listener(cb.clone());
    }
    node
}

fn first_failure(failures: Vec<Error>) -> Result<()> {
    match failures.into_iter().next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
