// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the MQTT switch using mockforge-mqtt.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use wolswitch::binding::{AccessoryBinding, MqttSwitch, ToggleHandler};
use wolswitch::error::BindingError;

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::AtomicU16;
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18950);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    // Give the broker time to bind
    sleep(Duration::from_millis(500)).await;
}

/// Connects a plain client subscribed to `filter`, forwarding payloads.
async fn connect_peer(port: u16, name: &str, filter: &str) -> (AsyncClient, mpsc::UnboundedReceiver<String>) {
    let options = MqttOptions::new(format!("peer_{name}_{port}"), "127.0.0.1", port);
    let (client, mut event_loop) = AsyncClient::new(options, 10);
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                    if tx.send(payload).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => sleep(Duration::from_millis(100)).await,
            }
        }
    });

    client.subscribe(filter, QoS::AtLeastOnce).await.unwrap();
    sleep(Duration::from_millis(300)).await;
    (client, rx)
}

async fn build_switch(port: u16, topic: &str) -> MqttSwitch {
    MqttSwitch::builder()
        .broker(format!("mqtt://127.0.0.1:{port}"))
        .topic(topic)
        .build()
        .await
        .unwrap()
}

async fn next_payload(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no message within 2 s")
        .expect("peer stopped")
}

#[derive(Default)]
struct Recorder {
    ons: AtomicUsize,
    offs: AtomicUsize,
}

#[async_trait]
impl ToggleHandler for Recorder {
    async fn on_toggle(&self, on: bool) {
        let counter = if on { &self.ons } else { &self.offs };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Waits until `counter` reaches `expected`, failing after 2 s.
async fn wait_for(counter: &AtomicUsize, expected: usize) {
    let reached = timeout(Duration::from_secs(2), async {
        while counter.load(Ordering::SeqCst) < expected {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "handler count stayed below {expected}");
}

mod connection {
    use super::*;

    #[tokio::test]
    async fn connect_to_broker() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let result = MqttSwitch::builder()
            .broker(format!("mqtt://127.0.0.1:{port}"))
            .topic("wolswitch/test")
            .build()
            .await;

        assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
        let switch = result.unwrap();
        assert_eq!(switch.topic(), "wolswitch/test");
        assert!(switch.is_connected());
    }

    #[tokio::test]
    async fn connect_with_tcp_scheme() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let result = MqttSwitch::builder()
            .broker(format!("tcp://127.0.0.1:{port}"))
            .topic("desk")
            .build()
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn no_broker_times_out() {
        let port = get_test_port();

        let result = MqttSwitch::builder()
            .broker(format!("127.0.0.1:{port}"))
            .topic("desk")
            .connection_timeout(Duration::from_millis(300))
            .build()
            .await;

        assert!(matches!(result, Err(BindingError::ConnectionFailed(_))));
    }
}

mod commands {
    use super::*;

    #[tokio::test]
    async fn set_commands_echo_state_and_reach_handler() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let switch = build_switch(port, "wolswitch/inbound").await;
        let recorder = Arc::new(Recorder::default());
        switch.attach(Arc::downgrade(&recorder) as Weak<dyn ToggleHandler>);

        let (peer, mut states) = connect_peer(port, "commander", "wolswitch/inbound/state").await;

        peer.publish("wolswitch/inbound/set", QoS::AtLeastOnce, false, "ON")
            .await
            .unwrap();
        assert_eq!(next_payload(&mut states).await, "ON");
        wait_for(&recorder.ons, 1).await;

        peer.publish("wolswitch/inbound/set", QoS::AtLeastOnce, false, "OFF")
            .await
            .unwrap();
        assert_eq!(next_payload(&mut states).await, "OFF");
        wait_for(&recorder.offs, 1).await;

        assert_eq!(recorder.ons.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retained_set_command_does_not_toggle() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let (peer, _updates) = connect_peer(port, "hub", "wolswitch/retained/none").await;
        peer.publish("wolswitch/retained/set", QoS::AtLeastOnce, true, "OFF")
            .await
            .unwrap();
        sleep(Duration::from_millis(200)).await;

        let recorder = Arc::new(Recorder::default());
        let switch = build_switch(port, "wolswitch/retained").await;
        switch.attach(Arc::downgrade(&recorder) as Weak<dyn ToggleHandler>);
        sleep(Duration::from_millis(500)).await;

        assert_eq!(recorder.offs.load(Ordering::SeqCst), 0);
    }
}

mod state {
    use super::*;

    #[tokio::test]
    async fn set_on_publishes_changes_only() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let switch = build_switch(port, "wolswitch/state_test").await;
        let (_peer, mut states) = connect_peer(port, "observer", "wolswitch/state_test/state").await;

        switch.set_on(true).await.unwrap();
        switch.set_on(true).await.unwrap();
        switch.set_on(false).await.unwrap();

        assert_eq!(next_payload(&mut states).await, "ON");
        assert_eq!(next_payload(&mut states).await, "OFF");
        assert!(
            timeout(Duration::from_millis(300), states.recv()).await.is_err(),
            "duplicate state was published"
        );
    }
}
