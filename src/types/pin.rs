// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Accessory pairing PIN.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::error::ValueError;

/// An eight-digit accessory pairing code.
///
/// Accepts `12345678` or the dashed `123-45-678` form. Its `Display`
/// output is masked so the code does not end up in logs.
///
/// # Examples
///
/// ```
/// use wolswitch::types::PairingPin;
///
/// let pin: PairingPin = "031-45-154".parse().unwrap();
/// assert_eq!(pin.formatted(), "031-45-154");
/// assert_eq!(pin.to_string(), "***-**-***");
///
/// assert!("1234".parse::<PairingPin>().is_err());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct PairingPin([u8; 8]);

impl PairingPin {
    /// Returns the code in `XXX-XX-XXX` form.
    #[must_use]
    pub fn formatted(&self) -> String {
        let d: String = self.0.iter().map(|b| char::from(b'0' + b)).collect();
        format!("{}-{}-{}", &d[0..3], &d[3..5], &d[5..8])
    }
}

impl FromStr for PairingPin {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let dashed = trimmed.len() == 10
            && trimmed.as_bytes()[3] == b'-'
            && trimmed.as_bytes()[6] == b'-';
        if !dashed && trimmed.contains('-') {
            return Err(ValueError::InvalidPin(s.to_string()));
        }

        let digits: Vec<u8> = trimmed
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_digit(10).and_then(|d| u8::try_from(d).ok()))
            .collect::<Option<_>>()
            .ok_or_else(|| ValueError::InvalidPin(s.to_string()))?;

        let digits: [u8; 8] = digits
            .try_into()
            .map_err(|_| ValueError::InvalidPin(s.to_string()))?;
        Ok(Self(digits))
    }
}

impl fmt::Display for PairingPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***-**-***")
    }
}

impl fmt::Debug for PairingPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PairingPin").field(&"***").finish()
    }
}

impl<'de> Deserialize<'de> for PairingPin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_dashed() {
        let plain: PairingPin = "03145154".parse().unwrap();
        let dashed: PairingPin = "031-45-154".parse().unwrap();
        assert_eq!(plain, dashed);
        assert_eq!(plain.formatted(), "031-45-154");
    }

    #[test]
    fn rejects_bad_input() {
        for input in ["", "1234567", "123456789", "12-345-678", "abcdefgh", "123-45-67x"] {
            assert!(input.parse::<PairingPin>().is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn debug_and_display_are_masked() {
        let pin: PairingPin = "11122333".parse().unwrap();
        assert!(!format!("{pin:?}").contains("111"));
        assert!(!pin.to_string().contains('1'));
    }
}
