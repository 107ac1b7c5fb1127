// crates/plcsim-rs/tests/plc_groups_test.rs

mod harness;

use harness::{event_request, events, init_logger, manual_config, value_request};
use plcsim_rs::manager::plc::{ROOT_FOLDER, tasks};
use plcsim_rs::manager::{CallMethodRequest, ExternalReferences, ReadValueId, WriteValue};
use plcsim_rs::monitoring::Notification;
use plcsim_rs::simulation::BAD_STATUS_SEQUENCE;
use plcsim_rs::{
    AttributeReadWriter, DataValue, NodeManager, PlcError, PlcNodeManager, SimulationConfig,
    StatusCode, SubscriptionSink, Variant,
};
use std::thread;
use std::time::Duration;

fn started(config: SimulationConfig) -> PlcNodeManager {
    init_logger();
    let manager = PlcNodeManager::new(config);
    manager
        .create_address_space(&mut ExternalReferences::new())
        .unwrap();
    manager
}

fn read(manager: &PlcNodeManager, name: &str) -> DataValue {
    manager.read(&[ReadValueId::value(manager.node_id(name))])[0]
        .clone()
        .unwrap()
        .unwrap()
}

fn call(manager: &PlcNodeManager, method: &str) -> Result<Vec<Variant>, PlcError> {
    manager.call(&[CallMethodRequest {
        object_id: manager.node_id(ROOT_FOLDER),
        method_id: manager.node_id(method),
        input_arguments: Vec::new(),
    }])[0]
        .clone()
        .unwrap()
}

#[test]
fn test_number_of_updates_limits_ticks() {
    let manager = started(manual_config());
    let write = manager.write(&[WriteValue::value(
        manager.node_id("SlowNumberOfUpdates"),
        3i32,
    )]);
    assert_eq!(write[0], Some(Ok(())));

    let mut seen = vec![read(&manager, "SlowUInt1").value];
    for _ in 0..5 {
        manager.fire(tasks::SLOW_NODES).unwrap();
        seen.push(read(&manager, "SlowUInt1").value);
    }
    assert_eq!(
        seen,
        [0u32, 1, 2, 3, 3, 3].map(Variant::UInt32).to_vec()
    );
    assert_eq!(read(&manager, "SlowNumberOfUpdates").value, Variant::Int32(0));

    manager.write(&[WriteValue::value(
        manager.node_id("SlowNumberOfUpdates"),
        -1i32,
    )]);
    for _ in 0..2 {
        manager.fire(tasks::SLOW_NODES).unwrap();
    }
    assert_eq!(read(&manager, "SlowUInt1").value, Variant::UInt32(5));
    assert_eq!(read(&manager, "SlowNumberOfUpdates").value, Variant::Int32(-1));
}

#[test]
fn test_control_writes_are_type_checked() {
    let manager = started(manual_config());
    let results = manager.write(&[
        WriteValue::value(manager.node_id("SlowNumberOfUpdates"), 2.5),
        WriteValue::value(manager.node_id("FastStepSize"), -1.0),
        WriteValue::value(manager.node_id("FastRandomize"), true),
        WriteValue::value(manager.node_id("SlowUInt1"), 9u32),
        WriteValue::value(manager.node_id("SlowStepSize"), 0.5),
    ]);
    assert_eq!(results[0], Some(Err(PlcError::TypeMismatch)));
    assert_eq!(results[1], Some(Err(PlcError::OutOfRange)));
    assert_eq!(results[2], Some(Ok(())));
    assert_eq!(results[3], Some(Err(PlcError::NotWritable)));
    // Unsigned groups reject fractional steps.
    assert_eq!(results[4], Some(Err(PlcError::OutOfRange)));
    assert_eq!(manager.diagnostics().groups[0].step_size, 1.0);
    let fast = &manager.diagnostics().groups[1];
    assert!(fast.randomize);
    assert_eq!(fast.step_size, 1.0);
}

#[test]
fn test_bad_nodes_follow_status_table() {
    let mut config = manual_config();
    config.fast.bad_nodes = 1;
    let manager = started(config);

    let mut observed = Vec::new();
    let mut last = read(&manager, "BadFastUInt1").value;
    for _ in 0..BAD_STATUS_SEQUENCE.len() * 2 {
        manager.fire(tasks::FAST_NODES).unwrap();
        let value = read(&manager, "BadFastUInt1");
        observed.push((value.status, value.value != last));
        last = value.value;
    }
    let expected: Vec<(StatusCode, bool)> = BAD_STATUS_SEQUENCE
        .iter()
        .chain(BAD_STATUS_SEQUENCE.iter())
        .copied()
        .collect();
    assert_eq!(observed, expected);
}

#[test]
fn test_stop_and_start_methods() {
    let manager = started(manual_config());
    assert_eq!(call(&manager, "StopUpdateFastNodes"), Ok(vec![]));
    let before = read(&manager, "FastUInt1").value;
    manager.fire(tasks::FAST_NODES).unwrap();
    assert_eq!(read(&manager, "FastUInt1").value, before);

    assert_eq!(call(&manager, "StartUpdateFastNodes"), Ok(vec![]));
    manager.fire(tasks::FAST_NODES).unwrap();
    assert_ne!(read(&manager, "FastUInt1").value, before);

    assert_eq!(call(&manager, "NoSuchMethod"), Err(PlcError::MethodInvalid));
}

#[test]
fn test_step_up_methods() {
    let manager = started(manual_config());
    for _ in 0..3 {
        manager.fire(tasks::STEP_UP).unwrap();
    }
    assert_eq!(read(&manager, "StepUp").value, Variant::UInt32(3));
    call(&manager, "StopStepUp").unwrap();
    manager.fire(tasks::STEP_UP).unwrap();
    assert_eq!(read(&manager, "StepUp").value, Variant::UInt32(3));
    call(&manager, "ResetStepUp").unwrap();
    assert_eq!(read(&manager, "StepUp").value, Variant::UInt32(0));
    call(&manager, "StartStepUp").unwrap();
    manager.fire(tasks::STEP_UP).unwrap();
    assert_eq!(read(&manager, "StepUp").value, Variant::UInt32(1));
}

#[test]
fn test_simple_events_from_root_folder() {
    let manager = started(manual_config());
    manager.fire(tasks::EVENTS).unwrap();
    manager.create_monitored_items(&[event_request(1, manager.node_id(ROOT_FOLDER))]);
    manager.fire(tasks::EVENTS).unwrap();
    manager.fire(tasks::EVENTS).unwrap();
    let messages: Vec<String> = events(manager.take_notifications(1).unwrap())
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(messages, ["Event with index 1", "Event with index 2"]);
}

#[test]
fn test_data_items_see_ticks() {
    let manager = started(manual_config());
    manager.create_monitored_items(&[value_request(5, manager.node_id("SlowUInt1"))]);
    manager.fire(tasks::SLOW_NODES).unwrap();
    let values: Vec<Variant> = manager
        .take_notifications(5)
        .unwrap()
        .into_iter()
        .filter_map(|n| match n {
            Notification::Data(dv) => Some(dv.value),
            Notification::Event(_) => None,
        })
        .collect();
    assert_eq!(values, [Variant::UInt32(0), Variant::UInt32(1)]);
}

#[test]
fn test_timers_run_on_threads() {
    init_logger();
    let mut config = SimulationConfig::default();
    config.fast.rate = Duration::from_millis(10);
    config.telemetry.cycle_length = Duration::from_millis(10);
    let manager = started(config);
    assert!(manager.diagnostics().running);

    thread::sleep(Duration::from_millis(200));
    manager.stop_simulation();
    let fast = read(&manager, "FastUInt1").value;
    let step_up = read(&manager, "StepUp").value;
    assert_ne!(fast, Variant::UInt32(0));
    assert_ne!(step_up, Variant::UInt32(0));

    thread::sleep(Duration::from_millis(50));
    assert_eq!(read(&manager, "FastUInt1").value, fast);
    manager.delete_address_space();
    assert!(!manager.diagnostics().running);
}
