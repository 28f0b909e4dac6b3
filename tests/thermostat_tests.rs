use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use venstar_colortouch::{
    Command, ConfigStore, DeviceClass, DeviceIdentity, DeviceSession, Direction, Driver, Error,
    Event, FanMode, ReportedMode, SensorRecord, TempUnit, Thermostat, ValidationFailure,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ADDRESS: &str = "7f000001";

fn info_body(mode: u8, away: u8, tempunits: u8) -> Value {
    json!({
        "name": "Hall",
        "mode": mode,
        "state": 0,
        "fan": 0,
        "fanstate": 0,
        "tempunits": tempunits,
        "schedule": 1,
        "schedulepart": 1,
        "away": away,
        "spacetemp": 71.0,
        "heattemp": 68.0,
        "cooltemp": 74.0,
        "setpointdelta": 2.0,
        "hum": 40.0
    })
}

async fn mount_info(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/query/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn host_of(server: &MockServer) -> String {
    let addr = server.address();
    format!("{}:{}", addr.ip(), addr.port())
}

fn thermostat_at(host: &str, unit: TempUnit, store: &ConfigStore) -> Thermostat {
    let session = DeviceSession::builder(host)
        .protocol("http")
        .pin(Some("1234".to_string()))
        .build()
        .expect("session should build");
    let identity = DeviceIdentity {
        id: ADDRESS.to_string(),
        name: "Hall".to_string(),
        class: DeviceClass::Residential,
        hostname: host.to_string(),
    };
    Thermostat::new(ADDRESS, identity, unit, session, store.clone())
}

fn driver(node: &Thermostat, driver: Driver) -> Option<f64> {
    node.drivers()
        .iter()
        .find(|d| d.driver == driver)
        .map(|d| d.value)
}

fn record_events(node: &mut Thermostat) -> Arc<Mutex<Vec<Event>>> {
    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(vec![]));
    let events_clone = events.clone();
    node.on_event(move |event| {
        events_clone.lock().unwrap().push(event.clone());
    });
    events
}

#[tokio::test]
async fn auto_mode_is_reported_as_is() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(3, 0, 0)).await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    assert!(node.refresh(true).await.expect("poll should succeed"));

    let state = node.state().unwrap();
    assert_eq!(state.heat_setpoint, 68.0);
    assert_eq!(state.cool_setpoint, 74.0);
    assert_eq!(state.reported_mode(), ReportedMode::Auto);
    assert_eq!(driver(&node, Driver::Mode), Some(3.0));
    assert_eq!(driver(&node, Driver::Online), Some(1.0));
    assert_eq!(driver(&node, Driver::Temperature), Some(71.0));
}

#[tokio::test]
async fn away_overrides_reported_mode_until_cleared() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(3, 1, 0)).await;
    Mock::given(method("POST"))
        .and(path("/settings"))
        .and(body_string_contains("away=0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    node.refresh(true).await.unwrap();
    assert_eq!(driver(&node, Driver::Mode), Some(13.0));
    assert_eq!(node.state().unwrap().mode.as_raw(), 3);

    node.execute(Command::SetAway(false))
        .await
        .expect("clearing away should succeed");
    server.verify().await;

    server.reset().await;
    mount_info(&server, info_body(3, 0, 0)).await;
    node.refresh(false).await.unwrap();
    assert_eq!(driver(&node, Driver::Mode), Some(3.0));
    assert_eq!(driver(&node, Driver::Away), Some(0.0));
}

#[tokio::test]
async fn rejected_setting_leaves_state_unchanged() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(3, 0, 0)).await;
    Mock::given(method("POST"))
        .and(path("/settings"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": true, "reason": "bad value"})),
        )
        .mount(&server)
        .await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    node.refresh(true).await.unwrap();

    let err = node.execute(Command::SetSchedule(false)).await.unwrap_err();
    match err {
        Error::Rejected { reason } => assert_eq!(reason, "bad value"),
        other => panic!("expected Rejected, got {other:?}"),
    }
    let state = node.state().unwrap();
    assert!(state.schedule_enabled);
    assert_eq!(state.schedule_phase.raw(), 1);
}

#[tokio::test]
async fn setpoint_command_posts_form_with_pin() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(3, 0, 0)).await;
    Mock::given(method("POST"))
        .and(path("/control"))
        .and(body_string_contains("heattemp=70"))
        .and(body_string_contains("cooltemp=74"))
        .and(body_string_contains("pin=1234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    node.execute(Command::SetHeatSetpoint(70.0))
        .await
        .expect("setpoint should be accepted");

    assert_eq!(node.state().unwrap().heat_setpoint, 70.0);
    assert_eq!(driver(&node, Driver::HeatSetpoint), Some(70.0));
}

#[tokio::test]
async fn step_in_heat_mode_moves_heat_setpoint_only() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(1, 0, 0)).await;
    Mock::given(method("POST"))
        .and(path("/control"))
        .and(body_string_contains("heattemp=67"))
        .and(body_string_contains("cooltemp=74"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    node.execute(Command::StepSetpoint(Direction::Down)).await.unwrap();
    assert_eq!(node.state().unwrap().heat_setpoint, 67.0);
    assert_eq!(node.state().unwrap().cool_setpoint, 74.0);
}

#[tokio::test]
async fn validation_failures_never_reach_the_device() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(3, 1, 0)).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&server)
        .await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);

    let err = node.execute(Command::SetHeatSetpoint(70.0)).await.unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationFailure::AwayActive)));
    let err = node.execute(Command::SetFanMode(FanMode::On)).await.unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationFailure::AwayActive)));
    assert_eq!(node.state().unwrap().heat_setpoint, 68.0);
}

#[tokio::test]
async fn auto_separation_is_enforced() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(3, 0, 0)).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&server)
        .await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);

    let err = node.execute(Command::SetHeatSetpoint(73.0)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationFailure::SetpointSeparation { .. })
    ));
    assert_eq!(node.state().unwrap().heat_setpoint, 68.0);
}

#[tokio::test]
async fn leaving_away_through_mode_clears_away_first() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(3, 1, 0)).await;
    Mock::given(method("POST"))
        .and(path("/settings"))
        .and(body_string_contains("away=0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/control"))
        .and(body_string_contains("mode=1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    node.execute(Command::SetMode(ReportedMode::Heat)).await.unwrap();
    assert_eq!(driver(&node, Driver::Mode), Some(1.0));
    assert_eq!(driver(&node, Driver::Away), Some(0.0));
}

#[tokio::test]
async fn server_error_reports_offline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query/info"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    let events = record_events(&mut node);

    assert!(!node.refresh(true).await.expect("offline is not an error"));
    assert!(!node.is_online());
    assert_eq!(driver(&node, Driver::Online), Some(0.0));
    assert_eq!(driver(&node, Driver::Temperature), None);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::DriverChanged { driver: Driver::Online, value, .. } if *value == 0.0
    ));
}

#[tokio::test]
async fn unreachable_host_reports_offline() {
    let store = ConfigStore::in_memory();
    let mut node = thermostat_at("127.0.0.1:1", TempUnit::Fahrenheit, &store);
    assert!(!node.refresh(true).await.unwrap());

    let err = node.execute(Command::SetAway(true)).await.unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn malformed_payload_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query/info"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    let err = node.refresh(false).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test]
async fn unchanged_poll_emits_nothing() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(3, 0, 0)).await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    let events = record_events(&mut node);

    node.refresh(true).await.unwrap();
    let first = events.lock().unwrap().len();
    assert!(first > 0);

    node.refresh(false).await.unwrap();
    assert_eq!(events.lock().unwrap().len(), first);

    node.refresh(true).await.unwrap();
    assert_eq!(events.lock().unwrap().len(), first * 2);
}

#[tokio::test]
async fn unit_change_is_announced_before_drivers() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(1, 0, 1)).await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    node.register_sensor(0, "Outdoor");
    let events = record_events(&mut node);

    node.refresh(true).await.unwrap();
    assert_eq!(node.temp_unit(), TempUnit::Celsius);
    assert!(node.sensors().iter().all(|s| s.unit == TempUnit::Celsius));
    assert_eq!(
        store.device_record(ADDRESS).unwrap().temp_unit,
        TempUnit::Celsius
    );

    let events = events.lock().unwrap();
    assert_eq!(
        events[0],
        Event::TempUnitChanged {
            address: ADDRESS.to_string(),
            unit: TempUnit::Celsius,
        }
    );
    assert!(matches!(
        &events[1],
        Event::TempUnitChanged { address, .. } if address == "7f000001_s0"
    ));
    assert!(matches!(&events[2], Event::DriverChanged { .. }));
}

#[tokio::test]
async fn long_poll_reads_alerts_and_sensors() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(3, 0, 0)).await;
    Mock::given(method("GET"))
        .and(path("/query/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "alerts": [
                {"name": "Air Filter", "active": true},
                {"name": "UV Lamp", "active": false},
                {"name": "Service", "active": false}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/query/sensors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sensors": [
                {"name": "Space Temp", "temp": 71},
                {"name": "Outdoor", "temp": 40, "battery": 90, "type": "Outdoor"}
            ]
        })))
        .mount(&server)
        .await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    assert_eq!(node.register_sensors(["Space Temp", "Outdoor"]), 1);
    assert_eq!(node.register_sensors(["Space Temp", "Outdoor"]), 0);
    assert!(!node.register_sensor(3, "Space Temp"));

    node.refresh(true).await.unwrap();
    node.refresh_sensors_and_alerts(true).await.unwrap();

    assert_eq!(driver(&node, Driver::FilterAlert), Some(1.0));
    assert_eq!(driver(&node, Driver::UvLampAlert), Some(0.0));

    let sensor = &node.sensors()[0];
    assert_eq!(sensor.address, "7f000001_s0");
    let temp = sensor
        .drivers()
        .iter()
        .find(|d| d.driver == Driver::Temperature)
        .map(|d| d.value);
    assert_eq!(temp, Some(40.0));
    let battery = sensor
        .drivers()
        .iter()
        .find(|d| d.driver == Driver::BatteryLevel)
        .map(|d| d.value);
    assert_eq!(battery, Some(90.0));
}

#[tokio::test]
async fn disconnect_reports_offline_and_closes_session() {
    let server = MockServer::start().await;
    mount_info(&server, info_body(3, 0, 0)).await;

    let store = ConfigStore::in_memory();
    let mut node = thermostat_at(&host_of(&server), TempUnit::Fahrenheit, &store);
    node.refresh(true).await.unwrap();
    node.disconnect();

    assert!(!node.is_online());
    assert_eq!(driver(&node, Driver::Online), Some(0.0));
    assert!(!node.refresh(false).await.unwrap());
}

#[tokio::test]
async fn sensor_numbering_skips_space_temp() {
    let store = ConfigStore::in_memory();
    let mut node = thermostat_at("127.0.0.1:9", TempUnit::Fahrenheit, &store);
    let added = node.register_sensors(["Outdoor", "Space Temp", "Bedroom", "Garage"]);
    assert_eq!(added, 3);

    let addresses: Vec<&str> = node.sensors().iter().map(|s| s.address.as_str()).collect();
    assert_eq!(addresses, ["7f000001_s0", "7f000001_s1", "7f000001_s2"]);
    assert_eq!(node.sensors()[1].name, "Bedroom");

    assert_eq!(
        store.sensor_record("7f000001_s2"),
        Some(SensorRecord {
            parent: ADDRESS.to_string(),
            name: "Garage".to_string(),
        })
    );
    assert_eq!(
        store.sensor_addresses(),
        ["7f000001_s0", "7f000001_s1", "7f000001_s2"]
    );
}
