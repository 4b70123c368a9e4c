// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Switch event types.

use crate::probe::ProbeReport;

/// Something the controller did or observed.
///
/// Errors are carried as rendered strings so events stay `Clone`.
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchEvent {
    /// The binding delivered a user toggle.
    ToggleRequested {
        /// Requested state.
        on: bool,
    },

    /// A magic packet was handed to the network layer.
    WakeSent,

    /// Sending the magic packet failed.
    WakeFailed {
        /// Rendered error.
        error: String,
    },

    /// The suspend command ran successfully.
    SuspendSucceeded,

    /// The suspend session failed.
    SuspendFailed {
        /// Rendered error.
        error: String,
    },

    /// A probe completed and the displayed state was updated.
    ProbeCompleted {
        /// Raw probe counters.
        report: ProbeReport,
        /// The state derived from the report.
        reachable: bool,
    },

    /// The probe mechanism failed; the displayed state was left alone.
    ProbeFailed {
        /// Rendered error.
        error: String,
    },
}

impl SwitchEvent {
    /// Returns `true` for the result of a power action (wake or suspend).
    #[must_use]
    pub fn is_action_outcome(&self) -> bool {
        matches!(
            self,
            Self::WakeSent
                | Self::WakeFailed { .. }
                | Self::SuspendSucceeded
                | Self::SuspendFailed { .. }
        )
    }

    /// Returns `true` for probe results, successful or not.
    #[must_use]
    pub fn is_probe(&self) -> bool {
        matches!(self, Self::ProbeCompleted { .. } | Self::ProbeFailed { .. })
    }

    /// Returns `true` if this event reports a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::WakeFailed { .. } | Self::SuspendFailed { .. } | Self::ProbeFailed { .. }
        )
    }

    /// Creates a wake failure event.
    #[must_use]
    pub fn wake_failed(error: &impl std::fmt::Display) -> Self {
        Self::WakeFailed {
            error: error.to_string(),
        }
    }

    /// Creates a suspend failure event.
    #[must_use]
    pub fn suspend_failed(error: &impl std::fmt::Display) -> Self {
        Self::SuspendFailed {
            error: error.to_string(),
        }
    }

    /// Creates a probe failure event.
    #[must_use]
    pub fn probe_failed(error: &impl std::fmt::Display) -> Self {
        Self::ProbeFailed {
            error: error.to_string(),
        }
    }
}
