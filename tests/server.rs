mod common;

use std::sync::Arc;

use common::{test_config, Failures, MockBus, Received};
use gattlink::bus::Interface;
use gattlink::error::ErrorKind;
use gattlink::gatt::{GattService, PropertyValue};
use gattlink::recv::{recv, RecvInfo};
use gattlink::{server, Context};

fn subscribed_service(context: &Arc<Context>, hci: &str) -> Arc<GattService> {
    let service = GattService::new(context, hci, None).unwrap();
    service.start_notify().unwrap();
    service
}

#[tokio::test]
async fn recv_requires_the_whole_fragment_to_be_consumed() {
    let context = Context::new(test_config());
    let received = Received::default();

    let info = RecvInfo::new("peer", Some(received.callback(|len| len)), &context);
    assert!(recv(&info, b"abc"));

    let info = RecvInfo::new("peer", Some(received.callback(|len| len - 1)), &context);
    assert!(!recv(&info, b"abc"));

    let info = RecvInfo::new("peer", None, &context);
    assert!(!recv(&info, b"abc"));
    assert!(!recv(&RecvInfo::default(), b"abc"));

    assert_eq!(received.take().len(), 2);
}

#[tokio::test]
async fn recv_fails_once_the_context_is_gone() {
    let context = Context::new(test_config());
    let received = Received::default();
    let info = RecvInfo::new("peer", Some(received.callback(|len| len)), &context);

    let weak = Arc::downgrade(&context);
    drop(context);
    assert_eq!(weak.strong_count(), 0);

    assert!(!recv(&info, b"abc"));
    assert!(received.take().is_empty());
}

#[tokio::test]
async fn subscribed_service_does_not_keep_the_context_alive() {
    let context = Context::new(test_config());
    let service = subscribed_service(&context, "hci0");
    assert!(context.lookup_peer(&service.peer_address()).is_some());

    let weak = Arc::downgrade(&context);
    drop(context);
    assert_eq!(weak.strong_count(), 0);
}

#[tokio::test]
async fn write_value_is_delivered_to_the_subscribed_peer() {
    let context = Context::new(test_config());
    let received = Received::default();
    context.set_callbacks(|x| x.server_packet_received = Some(received.callback(|len| len)));

    let service = subscribed_service(&context, "hci0");
    service.write_value(b"hello").unwrap();

    assert_eq!(received.take(), vec![(service.peer_address(), b"hello".to_vec())]);
}

#[tokio::test]
async fn write_value_fails_when_the_fragment_is_not_consumed() {
    let context = Context::new(test_config());
    let received = Received::default();
    context.set_callbacks(|x| x.server_packet_received = Some(received.callback(|_| 0)));

    let service = subscribed_service(&context, "hci0");
    let err = service.write_value(b"hello").unwrap_err();
    assert_eq!(err.message(), "Error when handling GATT request data fragment");
}

#[tokio::test]
async fn write_value_fails_without_a_subscribed_peer() {
    let context = Context::new(test_config());
    let received = Received::default();
    context.set_callbacks(|x| x.server_packet_received = Some(received.callback(|len| len)));

    let service = GattService::new(&context, "hci0", None).unwrap();
    assert!(service.write_value(b"hello").is_err());
    assert!(received.take().is_empty());
}

#[tokio::test]
async fn start_notify_twice_fails() {
    let context = Context::new(test_config());
    let service = subscribed_service(&context, "hci0");

    let err = service.start_notify().unwrap_err();
    assert_eq!(err.message(), "Notifications are already enabled.");
    assert!(service.response().is_notifying());
    assert_eq!(context.subscribed_peers(), vec![service.peer_address()]);
}

#[tokio::test]
async fn stop_notify_without_start_fails() {
    let context = Context::new(test_config());
    let service = GattService::new(&context, "hci0", None).unwrap();

    let err = service.stop_notify().unwrap_err();
    assert_eq!(err.message(), "Notifications were not previously enabled.");
    assert!(!service.response().is_notifying());
}

#[tokio::test]
async fn start_notify_fails_once_the_context_is_gone() {
    let context = Context::new(test_config());
    let service = GattService::new(&context, "hci0", None).unwrap();
    drop(context);

    let err = service.start_notify().unwrap_err();
    assert_eq!(err.message(), "Error creating peer endpoint information");
    assert!(!service.response().is_notifying());
}

#[tokio::test]
async fn invalid_adapter_name_is_rejected() {
    let context = Context::new(test_config());
    let err = GattService::new(&context, "hci0/../x", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
}

#[tokio::test]
async fn send_response_notifies_a_subscribed_peer_only() {
    let bus = MockBus::with_adapter();
    let context = Context::new(test_config());
    let _events = context.attach(bus.clone()).await.unwrap();
    let failures = Failures::default();
    context.set_callbacks(|x| x.server_error = Some(failures.callback()));

    let service = subscribed_service(&context, "hci0");
    let peer = service.peer_address();

    server::send_response(&context, &peer, b"pong").await.unwrap();
    assert_eq!(
        bus.values.lock().clone(),
        vec![(service.response().object_path().to_owned(), b"pong".to_vec())]
    );

    service.stop_notify().unwrap();
    assert!(context.lookup_peer(&peer).is_none());

    let err = server::send_response(&context, &peer, b"again").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotSubscribed);
    assert_eq!(bus.values.lock().len(), 1);
    assert_eq!(
        failures.take(),
        vec![(Some(peer), b"again".to_vec(), ErrorKind::NotSubscribed)]
    );
}

#[tokio::test]
async fn send_response_to_unknown_peer_does_not_touch_the_bus() {
    let bus = MockBus::with_adapter();
    let context = Context::new(test_config());
    let _events = context.attach(bus.clone()).await.unwrap();

    let err = server::send_response(&context, "&0x1234", b"pong").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotSubscribed);
    assert!(bus.values.lock().is_empty());
}

#[tokio::test]
async fn send_response_to_all_notifies_every_subscribed_peer() {
    let bus = MockBus::with_adapter();
    let context = Context::new(test_config());
    let _events = context.attach(bus.clone()).await.unwrap();

    let first = subscribed_service(&context, "hci0");
    let second = subscribed_service(&context, "hci1");

    server::send_response_to_all(&context, b"pong").await.unwrap();

    let mut notified: Vec<String> = bus.values.lock().iter().map(|(path, _)| path.clone()).collect();
    notified.sort();
    assert_eq!(
        notified,
        vec![
            first.response().object_path().to_owned(),
            second.response().object_path().to_owned()
        ]
    );
}

#[tokio::test]
async fn send_response_to_all_stops_at_the_first_failure() {
    let bus = MockBus::with_adapter();
    let context = Context::new(test_config());
    let _events = context.attach(bus.clone()).await.unwrap();
    let failures = Failures::default();
    context.set_callbacks(|x| x.server_error = Some(failures.callback()));

    let _first = subscribed_service(&context, "hci0");
    let _second = subscribed_service(&context, "hci1");
    bus.fail_values.store(true, std::sync::atomic::Ordering::SeqCst);

    assert!(server::send_response_to_all(&context, b"pong").await.is_err());
    assert_eq!(failures.take().len(), 1);
}

#[tokio::test]
async fn send_response_to_all_without_subscribers_fails() {
    let bus = MockBus::with_adapter();
    let context = Context::new(test_config());
    let _events = context.attach(bus.clone()).await.unwrap();

    let err = server::send_response_to_all(&context, b"pong").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotSubscribed);
}

#[tokio::test]
async fn managed_objects_describe_the_whole_service() {
    let context = Context::new(test_config());
    let service = GattService::new(&context, "hci0", None).unwrap();

    let objects = service.managed_objects();
    let paths: Vec<&str> = objects.keys().map(String::as_str).collect();
    assert_eq!(
        paths,
        vec![
            "/org/iotivity/gatt/hci0/service0",
            "/org/iotivity/gatt/hci0/service0/char0",
            "/org/iotivity/gatt/hci0/service0/char0/desc0",
            "/org/iotivity/gatt/hci0/service0/char1",
            "/org/iotivity/gatt/hci0/service0/char1/desc0",
        ]
    );

    let request = &objects["/org/iotivity/gatt/hci0/service0/char0"][Interface::GattCharacteristic.name()];
    assert_eq!(
        request["Flags"],
        PropertyValue::Strings(vec!["write-without-response".to_owned()])
    );
    let response = &objects["/org/iotivity/gatt/hci0/service0/char1"][Interface::GattCharacteristic.name()];
    assert_eq!(response["Flags"], PropertyValue::Strings(vec!["notify".to_owned()]));
    assert_eq!(
        response["Service"],
        PropertyValue::ObjectPath("/org/iotivity/gatt/hci0/service0".to_owned())
    );

    assert_eq!(service.request().descriptor().read_value(), b"OIC Node Request".to_vec());
    assert_eq!(service.response().descriptor().read_value(), b"OIC Node Response".to_vec());

    for descriptor in [service.request().descriptor(), service.response().descriptor()] {
        let properties = &objects[descriptor.object_path()][Interface::GattDescriptor.name()];
        assert_eq!(properties["UUID"], PropertyValue::String("2901".to_owned()));
        assert_eq!(properties["Flags"], PropertyValue::Strings(vec!["read".to_owned()]));
    }
}
