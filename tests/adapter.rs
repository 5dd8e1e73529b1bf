mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{eventually, test_config, MockAdapter, MockBus, MockConnector};
use gattlink::bus::{BusEvent, Interface};
use gattlink::error::ErrorKind;
use gattlink::{AdapterState, LeAdapter};
use parking_lot::Mutex;

fn adapter_for(bus: &Arc<MockBus>) -> LeAdapter {
    LeAdapter::with_connector(test_config(), Arc::new(MockConnector(bus.clone())))
}

#[tokio::test]
async fn start_finds_the_local_adapter() {
    let bus = MockBus::with_adapter();
    let adapter = adapter_for(&bus);

    assert_eq!(adapter.address().await.unwrap_err().kind(), ErrorKind::AdapterNotEnabled);
    assert_eq!(adapter.state().await.unwrap_err().kind(), ErrorKind::AdapterNotEnabled);

    adapter.start().await.unwrap();
    assert!(adapter.is_started());
    assert_eq!(adapter.address().await.unwrap(), "00:11:22:33:44:55");
    assert_eq!(adapter.state().await.unwrap(), AdapterState::Disabled);

    adapter.start_gatt_client().await.unwrap();
    assert_eq!(adapter.state().await.unwrap(), AdapterState::Enabled);

    adapter.stop().await.unwrap();
    assert!(!adapter.is_started());
    assert!(adapter.context().adapters().is_empty());
}

#[tokio::test]
async fn start_without_hardware_fails() {
    let bus = Arc::new(MockBus::default());
    let adapter = adapter_for(&bus);

    let err = adapter.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoHardware);
    assert!(!adapter.is_started());
    assert!(!adapter.context().is_attached());
}

#[tokio::test]
async fn start_twice_fails() {
    let bus = MockBus::with_adapter();
    let adapter = adapter_for(&bus);

    adapter.start().await.unwrap();
    assert_eq!(adapter.start().await.unwrap_err().kind(), ErrorKind::AlreadyStarted);
}

#[tokio::test]
async fn stop_before_start_fails() {
    let bus = MockBus::with_adapter();
    let adapter = adapter_for(&bus);

    assert_eq!(adapter.stop().await.unwrap_err().kind(), ErrorKind::AdapterNotEnabled);
}

#[tokio::test]
async fn adapters_come_and_go() {
    let bus = MockBus::with_adapter();
    let adapter = adapter_for(&bus);
    adapter.start().await.unwrap();
    let context = adapter.context();

    let hci1 = MockAdapter::new("hci1", "00:11:22:33:44:66", &bus.log);
    assert!(bus.emit(BusEvent::AdapterAdded(hci1)));
    assert!(eventually(|| context.adapters().len() == 2).await);

    assert!(bus.emit(BusEvent::InterfacesRemoved {
        path: "/org/bluez/hci0".to_owned(),
        interfaces: vec![Interface::Adapter.name().to_owned()],
    }));
    assert!(eventually(|| context.adapters().len() == 1).await);
    assert_eq!(context.adapters()[0].name(), "hci1");
}

#[tokio::test]
async fn power_changes_reach_the_state_callback() {
    let bus = MockBus::with_adapter();
    let adapter = adapter_for(&bus);
    let states = Arc::new(Mutex::new(Vec::<AdapterState>::new()));
    {
        let states = states.clone();
        adapter.set_adapter_state_callback(Arc::new(move |state: AdapterState| states.lock().push(state)));
    }
    adapter.start().await.unwrap();

    for powered in [true, false] {
        assert!(bus.emit(BusEvent::AdapterPowered {
            path: "/org/bluez/hci0".to_owned(),
            address: "00:11:22:33:44:55".to_owned(),
            powered,
        }));
    }
    assert!(eventually(|| states.lock().len() == 2).await);
    assert_eq!(
        states.lock().clone(),
        vec![AdapterState::Enabled, AdapterState::Disabled]
    );

    adapter.unset_adapter_state_callback();
    assert!(bus.emit(BusEvent::AdapterPowered {
        path: "/org/bluez/hci0".to_owned(),
        address: "00:11:22:33:44:55".to_owned(),
        powered: true,
    }));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(states.lock().len(), 2);
}

#[tokio::test]
async fn terminate_stops_everything() {
    let bus = MockBus::with_adapter();
    let adapter = adapter_for(&bus);
    adapter.start().await.unwrap();
    adapter.start_gatt_server().await.unwrap();

    adapter.terminate().await;

    assert!(!adapter.is_started());
    assert!(!adapter.peripheral().is_started());
    assert!(bus.exported.lock().is_empty());
    assert_eq!(adapter.start().await.unwrap_err().kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn stop_also_stops_the_gatt_server() {
    let bus = MockBus::with_adapter();
    let adapter = adapter_for(&bus);
    adapter.start().await.unwrap();
    adapter.start_gatt_server().await.unwrap();

    adapter.stop().await.unwrap();

    assert!(!adapter.is_started());
    assert!(!adapter.peripheral().is_started());
    assert!(bus.exported.lock().is_empty());
    assert!(bus.advertisements.lock().is_empty());
    assert!(bus.names.lock().is_empty());
    assert!(!bus.adapter(0).discoverable.load(Ordering::SeqCst));

    adapter.start().await.unwrap();
    adapter.start_gatt_server().await.unwrap();
    assert!(adapter.peripheral().is_started());
    assert_eq!(bus.exported.lock().len(), 1);
}

#[tokio::test]
async fn dropping_a_started_adapter_shuts_it_down() {
    let bus = MockBus::with_adapter();
    let adapter = adapter_for(&bus);
    adapter.start().await.unwrap();
    adapter.start_gatt_server().await.unwrap();
    bus.exported_service("hci0").unwrap().start_notify().unwrap();
    let context = Arc::downgrade(adapter.context());

    drop(adapter);

    assert!(eventually(|| context.strong_count() == 0).await);
    assert!(bus.exported.lock().is_empty());
    assert!(bus.advertisements.lock().is_empty());
    assert!(bus.names.lock().is_empty());
    assert!(!bus.adapter(0).discoverable.load(Ordering::SeqCst));
}
