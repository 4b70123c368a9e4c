// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reachability probing.
//!
//! A probe sends a handful of echo requests and reports how many came back.
//! The controller treats the machine as on only when every request was
//! answered.
//!
//! Two outcomes are kept apart:
//!
//! - `Ok(report)` with losses: the machine did not answer. This is a
//!   normal result and drives the switch to off.
//! - `Err(ProbeError)`: the probe could not run at all (no socket, no
//!   privileges). Nothing is known about the machine.

mod icmp;

pub use icmp::IcmpProber;

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::ProbeError;

/// Echo requests sent per probe unless configured otherwise.
pub const DEFAULT_PROBE_COUNT: u32 = 3;

/// Counters from one probe run.
///
/// # Examples
///
/// ```
/// use wolswitch::probe::ProbeReport;
///
/// let report = ProbeReport::new(3, 2);
/// assert!(!report.all_answered());
/// assert!((report.loss_ratio() - 1.0 / 3.0).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    transmitted: u32,
    received: u32,
}

impl ProbeReport {
    /// Creates a report. `received` is clamped to `transmitted`.
    #[must_use]
    pub fn new(transmitted: u32, received: u32) -> Self {
        Self {
            transmitted,
            received: received.min(transmitted),
        }
    }

    /// Echo requests sent.
    #[must_use]
    pub fn transmitted(&self) -> u32 {
        self.transmitted
    }

    /// Echo replies received.
    #[must_use]
    pub fn received(&self) -> u32 {
        self.received
    }

    /// Fraction of requests left unanswered, in `[0, 1]`.
    ///
    /// An empty report counts as total loss.
    #[must_use]
    pub fn loss_ratio(&self) -> f64 {
        if self.transmitted == 0 {
            return 1.0;
        }
        f64::from(self.transmitted - self.received) / f64::from(self.transmitted)
    }

    /// `true` iff at least one request was sent and all were answered.
    #[must_use]
    pub fn all_answered(&self) -> bool {
        self.transmitted > 0 && self.received == self.transmitted
    }
}

/// Checks whether a machine answers on the network.
#[async_trait]
pub trait ReachabilityProber: Send + Sync {
    /// Probes `address` once.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] only when the probe mechanism itself fails.
    /// An unreachable machine is reported through the returned counters.
    async fn probe(&self, address: IpAddr) -> Result<ProbeReport, ProbeError>;
}
