// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller activity events.
//!
//! The controller publishes a [`SwitchEvent`] for every toggle, power
//! action outcome and probe result. Subscribers get their own receiver
//! from the [`EventBus`]; nothing is published anywhere else, so the
//! bus costs nothing when nobody listens.
//!
//! # Examples
//!
//! ```
//! use wolswitch::event::{EventBus, SwitchEvent};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(SwitchEvent::ToggleRequested { on: true });
//! assert!(matches!(rx.try_recv(), Ok(SwitchEvent::ToggleRequested { on: true })));
//! ```

mod event_bus;
mod switch_event;

pub use event_bus::EventBus;
pub use switch_event::SwitchEvent;
