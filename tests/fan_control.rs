use std::{
    fs,
    path::PathBuf,
    time::{Duration, Instant},
};

use fancontrol::{
    config_store::ConfigStore,
    control_loop::{ControlError, FaultPolicy, LoopSettings},
    fan_curve::{BreakpointTable, DEFAULT_TABLE, TemperaturePoint},
    hardware::fake::{RecordingActuator, ScriptedSensor},
    lifecycle_manager::{LifecycleError, LifecycleManager, LoopState},
};

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fancontrol_it_{name}"));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn settings(tick_interval_ms: u64, fault_policy: FaultPolicy) -> LoopSettings {
    LoopSettings {
        tick_interval_ms,
        fault_policy,
    }
}

#[tokio::test]
async fn first_boot_runs_default_curve() {
    let store = ConfigStore::new(&test_dir("first_boot").join("config"));
    let table = store.load().unwrap();
    assert_eq!(table, DEFAULT_TABLE);

    let sensor = ScriptedSensor::new(&[45.]);
    let actuator = RecordingActuator::new();
    let mut manager = LifecycleManager::init(
        table,
        Box::new(sensor.clone()),
        Box::new(actuator.clone()),
        settings(10, FaultPolicy::FailFast),
    );

    manager.start().unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;

    sensor.set(150.);
    tokio::time::sleep(Duration::from_millis(40)).await;

    manager.stop().await.unwrap();

    let levels = actuator.levels();
    let first = levels[0];
    assert!(first > 0.5 && first < 0.6);
    assert_eq!(actuator.last_level(), Some(1.0));
    assert_eq!(actuator.close_count(), 1);

    // The store was populated on first boot
    assert_eq!(store.load().unwrap(), DEFAULT_TABLE);
}

#[tokio::test]
async fn stored_curve_drives_the_fan() {
    let store = ConfigStore::new(&test_dir("stored_curve"));
    let table = BreakpointTable::new([
        TemperaturePoint::new(30, 0.3),
        TemperaturePoint::new(40, 0.4),
        TemperaturePoint::new(60, 0.5),
        TemperaturePoint::new(70, 0.9),
        TemperaturePoint::new(80, 1.0),
    ])
    .unwrap();
    store.save(Some(&table)).unwrap();

    let sensor = ScriptedSensor::new(&[70.]);
    let actuator = RecordingActuator::new();
    let mut manager = LifecycleManager::init(
        store.load().unwrap(),
        Box::new(sensor),
        Box::new(actuator.clone()),
        settings(10, FaultPolicy::FailFast),
    );

    manager.start().unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    manager.stop().await.unwrap();

    assert!(actuator.levels().iter().all(|level| *level == 0.9));
}

#[tokio::test]
async fn negative_readings_do_not_change_the_level() {
    let sensor = ScriptedSensor::new(&[55.]);
    let actuator = RecordingActuator::new();
    let mut manager = LifecycleManager::init(
        DEFAULT_TABLE,
        Box::new(sensor.clone()),
        Box::new(actuator.clone()),
        settings(10, FaultPolicy::FailFast),
    );

    manager.start().unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let known = actuator.last_level().unwrap();

    sensor.set(-12.);
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.stop().await.unwrap();

    assert!(actuator.levels().iter().all(|level| *level == known));
}

#[tokio::test]
async fn sensor_failure_ends_the_loop_under_fail_fast() {
    let sensor = ScriptedSensor::new(&[50.]);
    let actuator = RecordingActuator::new();
    let mut manager = LifecycleManager::init(
        DEFAULT_TABLE,
        Box::new(sensor.clone()),
        Box::new(actuator.clone()),
        settings(10, FaultPolicy::FailFast),
    );

    manager.start().unwrap();
    tokio::time::sleep(Duration::from_millis(25)).await;
    sensor.push_failure();

    let result = manager.wait().await;

    assert!(matches!(
        result,
        Err(LifecycleError::Loop(ControlError::SensorRead(_)))
    ));
    assert_eq!(manager.state(), LoopState::Stopped);
    assert_eq!(actuator.close_count(), 1);
}

#[tokio::test]
async fn hold_last_level_survives_sensor_outage() {
    let sensor = ScriptedSensor::new(&[60.]);
    let actuator = RecordingActuator::new();
    let mut manager = LifecycleManager::init(
        DEFAULT_TABLE,
        Box::new(sensor.clone()),
        Box::new(actuator.clone()),
        settings(10, FaultPolicy::HoldLastLevel),
    );

    manager.start().unwrap();
    tokio::time::sleep(Duration::from_millis(25)).await;

    sensor.push_failure();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(manager.state(), LoopState::Running);

    manager.stop().await.unwrap();
    assert!(actuator.levels().iter().all(|level| *level == 0.7));
}

#[tokio::test]
async fn stop_returns_within_one_tick() {
    let sensor = ScriptedSensor::new(&[50.]);
    let actuator = RecordingActuator::new();
    let tick = settings(200, FaultPolicy::FailFast);
    let tick_interval = tick.tick_interval();
    let mut manager = LifecycleManager::init(
        DEFAULT_TABLE,
        Box::new(sensor),
        Box::new(actuator.clone()),
        tick,
    );

    manager.start().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stop_started = Instant::now();
    manager.stop().await.unwrap();

    assert!(stop_started.elapsed() < tick_interval);
    assert_eq!(manager.state(), LoopState::Stopped);
    assert_eq!(actuator.close_count(), 1);
}

#[tokio::test]
async fn stop_interrupts_retry_backoff() {
    let sensor = ScriptedSensor::new(&[50.]);
    sensor.push_failure();
    let actuator = RecordingActuator::new();
    let policy = FaultPolicy::Retry {
        attempts: 5,
        backoff_ms: 500,
    };
    let mut manager = LifecycleManager::init(
        DEFAULT_TABLE,
        Box::new(sensor),
        Box::new(actuator.clone()),
        settings(10, policy),
    );

    manager.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The loop is sleeping in its first backoff by now
    let stop_started = Instant::now();
    let result = manager.stop().await;

    assert!(result.is_ok(), "got {result:?}");
    assert!(stop_started.elapsed() < Duration::from_millis(200));
    assert_eq!(manager.state(), LoopState::Stopped);
    assert_eq!(actuator.close_count(), 1);
}

#[tokio::test]
async fn actuator_open_failure_is_reported_by_wait() {
    let sensor = ScriptedSensor::new(&[50.]);
    let actuator = RecordingActuator::new();
    actuator.fail_open();
    let mut manager = LifecycleManager::init(
        DEFAULT_TABLE,
        Box::new(sensor),
        Box::new(actuator.clone()),
        settings(10, FaultPolicy::HoldLastLevel),
    );

    manager.start().unwrap();

    assert!(matches!(
        manager.wait().await,
        Err(LifecycleError::Loop(ControlError::ActuatorOpen(_)))
    ));
    assert!(actuator.levels().is_empty());
}

#[tokio::test]
async fn actuator_close_failure_is_reported_by_stop() {
    let sensor = ScriptedSensor::new(&[50.]);
    let actuator = RecordingActuator::new();
    actuator.fail_close();
    let mut manager = LifecycleManager::init(
        DEFAULT_TABLE,
        Box::new(sensor),
        Box::new(actuator.clone()),
        settings(10, FaultPolicy::FailFast),
    );

    manager.start().unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(matches!(
        manager.stop().await,
        Err(LifecycleError::Loop(ControlError::ActuatorClose(_)))
    ));
    assert_eq!(manager.state(), LoopState::Stopped);
    assert!(!actuator.levels().is_empty());
}
