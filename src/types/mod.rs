// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Validated value types.
//!
//! Each type checks its input at construction time, so code further in
//! never has to re-validate configuration values.
//!
//! # Types
//!
//! - [`MacAddress`] - Wake target hardware address
//! - [`PowerState`] - On/Off state exchanged with bindings
//! - [`PairingPin`] - Eight-digit accessory pairing code

mod mac;
mod pin;
mod power;

pub use mac::MacAddress;
pub use pin::PairingPin;
pub use power::PowerState;
