// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Accessory bindings.
//!
//! A binding is the smart-home side of the switch. It talks to the
//! controller through two narrow seams:
//!
//! - binding → controller: [`ToggleHandler::on_toggle`] whenever the user
//!   flips the switch;
//! - controller → binding: [`AccessoryBinding::set_on`] whenever a probe
//!   establishes the machine's state.
//!
//! A binding shows the user's requested value on its own as soon as the
//! toggle arrives; the controller only ever pushes probe results. This
//! keeps the two directions from echoing into each other.
//!
//! Bindings keep only a weak reference to their handler so the
//! controller/binding pair does not form a reference cycle.
//!
//! # Bindings
//!
//! - [`MemorySwitch`]: in-process switch backed by a watch channel
//! - [`MqttSwitch`]: MQTT command/state topics

mod memory;
mod mqtt;

pub use memory::MemorySwitch;
pub use mqtt::{MqttSwitch, MqttSwitchBuilder};

use std::sync::Weak;

use async_trait::async_trait;

use crate::error::BindingError;

/// Receives user toggles from a binding.
#[async_trait]
pub trait ToggleHandler: Send + Sync {
    /// Called once per user toggle, on a task owned by the binding.
    async fn on_toggle(&self, on: bool);
}

/// The smart-home side of the switch.
#[async_trait]
pub trait AccessoryBinding: Send + Sync {
    /// Registers the handler for user toggles, replacing any previous one.
    fn attach(&self, handler: Weak<dyn ToggleHandler>);

    /// Updates the displayed switch state.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError`] if the new state could not be delivered.
    async fn set_on(&self, on: bool) -> Result<(), BindingError>;
}
