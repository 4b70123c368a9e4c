// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power state of the switch.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// The on/off state exchanged with an accessory binding.
///
/// # Examples
///
/// ```
/// use wolswitch::types::PowerState;
///
/// assert_eq!(PowerState::On.as_str(), "ON");
/// assert_eq!("off".parse::<PowerState>().unwrap(), PowerState::Off);
/// assert!(bool::from(PowerState::On));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    /// Machine is (believed to be) off.
    Off,
    /// Machine is (believed to be) on.
    On,
}

impl PowerState {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    /// Returns `true` for [`PowerState::On`].
    #[must_use]
    pub const fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OFF" | "0" | "FALSE" => Ok(Self::Off),
            "ON" | "1" | "TRUE" => Ok(Self::On),
            _ => Err(ValueError::InvalidPowerState(s.to_string())),
        }
    }
}

impl From<bool> for PowerState {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

impl From<PowerState> for bool {
    fn from(value: PowerState) -> Self {
        value.is_on()
    }
}
