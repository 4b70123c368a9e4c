// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power actions.
//!
//! - [`WakeDispatcher`]: powers the machine on. The bundled
//!   [`MagicPacketSender`] broadcasts a Wake-on-LAN magic packet.
//! - [`SuspendDispatcher`]: puts the machine to sleep. The bundled
//!   [`RemoteSuspend`] runs a command through a [`RemoteShell`], with
//!   [`RusshShell`] providing SSH sessions.
//!
//! Actions are single attempts. The controller never retries them; the
//! next reachability probe tells whether they worked.

mod ssh;
mod suspend;
mod wol;

pub use ssh::{RusshSession, RusshShell};
pub use suspend::{RemoteShell, RemoteSuspend, ShellSession};
pub use wol::{MagicPacket, MagicPacketSender};

use async_trait::async_trait;

use crate::config::SshTarget;
use crate::error::{SuspendError, WakeError};
use crate::types::MacAddress;

/// Sends a wake request to a machine.
#[async_trait]
pub trait WakeDispatcher: Send + Sync {
    /// Sends one wake request for `mac`.
    ///
    /// Success means the request left this host, not that the machine
    /// woke up.
    ///
    /// # Errors
    ///
    /// Returns [`WakeError`] if the request could not be sent.
    async fn wake(&self, mac: &MacAddress) -> Result<(), WakeError>;
}

/// Puts a machine to sleep.
#[async_trait]
pub trait SuspendDispatcher: Send + Sync {
    /// Runs one suspend attempt against `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SuspendError`] for connection, authentication, command or
    /// timeout failures.
    async fn suspend(&self, target: &SshTarget) -> Result<(), SuspendError>;
}
