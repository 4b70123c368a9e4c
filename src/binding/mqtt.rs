// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT switch binding.
//!
//! Topic layout, relative to the configured base topic:
//!
//! - `<topic>/set`: commands from the smart-home side (`ON`/`OFF`)
//! - `<topic>/state`: displayed state, retained
//! - `<topic>/availability`: `online` while connected, `offline` as last
//!   will

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, Publish, QoS};
use tokio::sync::oneshot;

use super::{AccessoryBinding, ToggleHandler};
use crate::error::BindingError;
use crate::types::PowerState;

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Delay before polling again after an event loop error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

struct Inner {
    client: AsyncClient,
    topic: String,
    handler: RwLock<Option<Weak<dyn ToggleHandler>>>,
    last_published: Mutex<Option<bool>>,
    connected: AtomicBool,
}

/// A switch exposed through MQTT topics.
///
/// Incoming `<topic>/set` commands are echoed to `<topic>/state` right
/// away and then handed to the attached [`ToggleHandler`] on a fresh task
/// per command. [`AccessoryBinding::set_on`] publishes to the state topic
/// unless the value matches what was last published.
///
/// Clones share the same connection.
///
/// # Examples
///
/// ```no_run
/// use wolswitch::binding::MqttSwitch;
///
/// # async fn example() -> Result<(), wolswitch::error::BindingError> {
/// let switch = MqttSwitch::builder()
///     .broker("mqtt://192.168.1.50:1883")
///     .topic("wolswitch/desktop")
///     .build()
///     .await?;
/// assert!(switch.is_connected());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MqttSwitch {
    inner: Arc<Inner>,
}

impl MqttSwitch {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> MqttSwitchBuilder {
        MqttSwitchBuilder::new()
    }

    /// Returns the base topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Returns `true` while the broker connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    fn from_client(client: AsyncClient, topic: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                topic,
                handler: RwLock::new(None),
                last_published: Mutex::new(None),
                connected: AtomicBool::new(false),
            }),
        }
    }

    fn set_topic(&self) -> String {
        format!("{}/set", self.inner.topic)
    }

    fn state_topic(&self) -> String {
        format!("{}/state", self.inner.topic)
    }

    /// Publishes from inside the event loop, where awaiting the request
    /// channel could stall the loop that drains it.
    fn try_publish_state(&self, on: bool) {
        let payload = PowerState::from(on).as_str();
        match self
            .inner
            .client
            .try_publish(self.state_topic(), QoS::AtLeastOnce, true, payload)
        {
            Ok(()) => *self.inner.last_published.lock() = Some(on),
            Err(e) => tracing::warn!(error = %e, "Cannot publish switch state"),
        }
    }

    fn on_connected(&self) {
        self.inner.connected.store(true, Ordering::Release);

        if let Err(e) = self
            .inner
            .client
            .try_subscribe(self.set_topic(), QoS::AtLeastOnce)
        {
            tracing::error!(error = %e, topic = %self.set_topic(), "Cannot subscribe");
        }
        if let Err(e) = self.inner.client.try_publish(
            availability_topic(&self.inner.topic),
            QoS::AtLeastOnce,
            true,
            "online",
        ) {
            tracing::warn!(error = %e, "Cannot publish availability");
        }

        // The broker may have lost the retained state while we were away.
        let last = *self.inner.last_published.lock();
        if let Some(on) = last {
            self.try_publish_state(on);
        }
    }

    fn on_publish(&self, publish: &Publish) {
        if publish.topic != self.set_topic() {
            return;
        }
        // Retained commands are replayed on every subscribe, not sent by a user.
        if publish.retain {
            tracing::debug!(topic = %publish.topic, "Ignoring retained switch command");
            return;
        }
        match std::str::from_utf8(&publish.payload) {
            Ok(payload) => self.on_command(payload),
            Err(_) => tracing::warn!("Ignoring non-UTF-8 switch command"),
        }
    }

    fn on_command(&self, payload: &str) {
        let state = match payload.parse::<PowerState>() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring switch command");
                return;
            }
        };
        let on = state.is_on();
        tracing::info!(%state, "Switch toggled");

        self.try_publish_state(on);

        let handler = self.inner.handler.read().as_ref().and_then(Weak::upgrade);
        match handler {
            Some(handler) => {
                tokio::spawn(async move { handler.on_toggle(on).await });
            }
            None => tracing::warn!("No toggle handler attached"),
        }
    }
}

impl std::fmt::Debug for MqttSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSwitch")
            .field("topic", &self.inner.topic)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AccessoryBinding for MqttSwitch {
    fn attach(&self, handler: Weak<dyn ToggleHandler>) {
        *self.inner.handler.write() = Some(handler);
    }

    async fn set_on(&self, on: bool) -> Result<(), BindingError> {
        if *self.inner.last_published.lock() == Some(on) {
            return Ok(());
        }

        let payload = PowerState::from(on).as_str();
        tracing::debug!(topic = %self.state_topic(), payload, "Publishing switch state");
        self.inner
            .client
            .publish(self.state_topic(), QoS::AtLeastOnce, true, payload)
            .await?;
        *self.inner.last_published.lock() = Some(on);
        Ok(())
    }
}

fn availability_topic(topic: &str) -> String {
    format!("{topic}/availability")
}

/// Parses an MQTT URL into host and port.
fn parse_mqtt_url(url: &str) -> Result<(String, u16), BindingError> {
    let url = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port) = if let Some((h, p)) = url.rsplit_once(':') {
        let port = p
            .parse()
            .map_err(|_| BindingError::InvalidAddress(format!("invalid port: {p}")))?;
        (h.to_string(), port)
    } else {
        (url.to_string(), 1883)
    };

    if host.is_empty() {
        return Err(BindingError::InvalidAddress("missing host".to_string()));
    }
    Ok((host, port))
}

/// Drives the MQTT connection for the lifetime of the switch.
async fn handle_switch_events(
    mut event_loop: EventLoop,
    switch: MqttSwitch,
    mut connack_tx: Option<oneshot::Sender<()>>,
) {
    use rumqttc::{Event, Packet};

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT connected");
                switch.on_connected();
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => switch.on_publish(&publish),
            Ok(_) => {}
            Err(e) => {
                if switch.inner.connected.swap(false, Ordering::AcqRel) {
                    tracing::warn!(error = %e, "MQTT connection lost");
                } else {
                    tracing::debug!(error = %e, "MQTT connection attempt failed");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Builder for [`MqttSwitch`].
#[derive(Debug)]
pub struct MqttSwitchBuilder {
    broker: Option<String>,
    topic: Option<String>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    keep_alive: Duration,
    connection_timeout: Duration,
}

impl MqttSwitchBuilder {
    /// Creates a builder with a 30 s keep-alive and a 10 s connection
    /// timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            broker: None,
            topic: None,
            username: None,
            password: None,
            client_id: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the broker URL.
    #[must_use]
    pub fn broker(mut self, broker: impl Into<String>) -> Self {
        self.broker = Some(broker.into());
        self
    }

    /// Sets the base topic. Leading and trailing slashes are dropped.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into().trim_matches('/').to_string());
        self
    }

    /// Sets broker credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets a custom client ID.
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Sets the keep-alive interval.
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    /// Sets how long to wait for the broker to accept the connection.
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.connection_timeout = duration;
        self
    }

    /// Connects to the broker.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::InvalidAddress`] for missing or malformed
    /// settings and [`BindingError::ConnectionFailed`] if the broker does
    /// not accept the connection in time.
    pub async fn build(self) -> Result<MqttSwitch, BindingError> {
        let broker = self
            .broker
            .ok_or_else(|| BindingError::InvalidAddress("broker is required".to_string()))?;
        let topic = self
            .topic
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BindingError::InvalidAddress("topic is required".to_string()))?;

        let (host, port) = parse_mqtt_url(&broker)?;

        let client_id = self.client_id.unwrap_or_else(|| {
            let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("wolswitch_{}_{}", std::process::id(), counter)
        });

        let mut mqtt_options = MqttOptions::new(&client_id, &host, port);
        mqtt_options.set_keep_alive(self.keep_alive);
        mqtt_options.set_clean_session(true);
        mqtt_options.set_last_will(LastWill::new(
            availability_topic(&topic),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));
        if let (Some(username), Some(password)) = (self.username, self.password) {
            mqtt_options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let switch = MqttSwitch::from_client(client, topic);

        let (connack_tx, connack_rx) = oneshot::channel();
        let task = tokio::spawn(handle_switch_events(
            event_loop,
            switch.clone(),
            Some(connack_tx),
        ));

        match tokio::time::timeout(self.connection_timeout, connack_rx).await {
            Ok(Ok(())) => {
                tracing::info!(%host, port, topic = %switch.topic(), "Connected to MQTT broker");
                Ok(switch)
            }
            Ok(Err(_)) => {
                task.abort();
                Err(BindingError::ConnectionFailed(
                    "MQTT event loop terminated unexpectedly".to_string(),
                ))
            }
            Err(_) => {
                task.abort();
                Err(BindingError::ConnectionFailed(format!(
                    "no answer from {host}:{port} after {}s",
                    self.connection_timeout.as_secs()
                )))
            }
        }
    }
}

impl Default for MqttSwitchBuilder {
    fn default() -> Self {
        Self::new()
    }
}
