// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `wolswitch` - expose a PC's power state as a smart-home switch.
//!
//! Turning the switch on broadcasts a Wake-on-LAN magic packet. Turning it
//! off runs a suspend command on the machine over SSH. A background poller
//! pings the machine every few seconds and reports what it finds back to
//! the switch, so the displayed state follows the real one.
//!
//! # Components
//!
//! - [`controller::PowerStateController`]: toggle handling and the probe
//!   loop
//! - [`action`]: wake and suspend dispatchers
//! - [`probe`]: reachability probing
//! - [`binding`]: the smart-home side (in-memory or MQTT)
//! - [`config`]: YAML configuration and credential loading
//! - [`event`]: observable controller activity
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use wolswitch::action::{MagicPacketSender, RemoteSuspend, RusshShell};
//! use wolswitch::binding::MqttSwitch;
//! use wolswitch::config::Config;
//! use wolswitch::controller::PowerStateController;
//! use wolswitch::probe::IcmpProber;
//!
//! #[tokio::main]
//! async fn main() -> wolswitch::Result<()> {
//!     let config = Config::load("config.yml")?;
//!
//!     let switch = MqttSwitch::builder()
//!         .broker(&config.mqtt.broker)
//!         .topic(&config.mqtt.topic)
//!         .build()
//!         .await?;
//!
//!     let controller = PowerStateController::new(
//!         config.machine_target()?,
//!         Arc::new(MagicPacketSender::new()),
//!         Arc::new(RemoteSuspend::new(RusshShell::new())),
//!         Arc::new(IcmpProber::new()),
//!         Arc::new(switch),
//!     )
//!     .attach();
//!
//!     controller.spawn_poller().await.ok();
//!     Ok(())
//! }
//! ```
//!
//! # Observing Activity
//!
//! ```no_run
//! # use wolswitch::controller::PowerStateController;
//! # async fn example(controller: &PowerStateController) {
//! let mut events = controller.events().subscribe();
//! while let Ok(event) = events.recv().await {
//!     if event.is_failure() {
//!         eprintln!("{event:?}");
//!     }
//! }
//! # }
//! ```

pub mod action;
pub mod binding;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod probe;
pub mod types;

pub use binding::{AccessoryBinding, MemorySwitch, MqttSwitch, ToggleHandler};
pub use config::{Config, MachineTarget, SshTarget};
pub use controller::PowerStateController;
pub use error::{
    BindingError, ConfigError, Error, ProbeError, Result, SuspendError, ValueError, WakeError,
};
pub use event::{EventBus, SwitchEvent};
pub use probe::{ProbeReport, ReachabilityProber};
pub use types::{MacAddress, PairingPin, PowerState};
