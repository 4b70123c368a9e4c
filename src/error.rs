// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for `wolswitch`.
//!
//! Errors fall into three groups:
//!
//! - [`ConfigError`]: startup failures (bad configuration, unreadable key).
//!   These are fatal and abort the process before the controller starts.
//! - [`WakeError`] and [`SuspendError`]: a power action failed. The
//!   controller logs them and carries on.
//! - [`ProbeError`]: the reachability probe itself could not run. This is
//!   different from the machine being unreachable, which is a normal probe
//!   result.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration or credential loading failed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sending the wake packet failed.
    #[error("wake error: {0}")]
    Wake(#[from] WakeError),

    /// Suspending the remote machine failed.
    #[error("suspend error: {0}")]
    Suspend(#[from] SuspendError),

    /// The reachability probe could not be run.
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    /// The accessory binding failed.
    #[error("binding error: {0}")]
    Binding(#[from] BindingError),
}

/// Errors related to value validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A hardware address string could not be parsed.
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// An invalid power state string was provided.
    #[error("invalid power state: {0}")]
    InvalidPowerState(String),

    /// A pairing PIN is not eight digits.
    #[error("invalid pairing PIN: {0}")]
    InvalidPin(String),
}

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for this schema.
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A configuration value is out of range or malformed.
    #[error("invalid value for `{field}`: {message}")]
    InvalidField {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The private key could not be read or decoded.
    #[error("cannot load private key {path}: {message}")]
    Credential {
        /// Path of the key file.
        path: PathBuf,
        /// Why the key was rejected.
        message: String,
    },

    /// The location of the configuration file could not be determined.
    #[error("cannot locate configuration file: {0}")]
    Locate(String),
}

/// Errors raised while sending a wake packet.
#[derive(Debug, Error)]
pub enum WakeError {
    /// The broadcast socket could not be opened or configured.
    #[error("cannot open broadcast socket: {0}")]
    Socket(#[source] std::io::Error),

    /// The packet could not be handed to the network layer.
    #[error("cannot send magic packet to {target}: {source}")]
    Send {
        /// Broadcast destination.
        target: std::net::SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The socket accepted fewer bytes than the packet holds.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes written.
        written: usize,
        /// Packet length.
        expected: usize,
    },
}

/// Errors raised while suspending the remote machine.
#[derive(Debug, Error)]
pub enum SuspendError {
    /// TCP connection or SSH handshake failed.
    #[error("connection to {host}:{port} failed: {message}")]
    Connect {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Cause of the failure.
        message: String,
    },

    /// The server rejected the key.
    #[error("authentication failed for user {0}")]
    AuthenticationFailed(String),

    /// Protocol failure after the session was established.
    #[error("session error: {0}")]
    Session(String),

    /// The suspend command exited with a non-zero status.
    #[error("command `{command}` exited with status {status}")]
    CommandFailed {
        /// The command that was run.
        command: String,
        /// Its exit status.
        status: u32,
    },

    /// The operation did not complete in time.
    #[error("{stage} timed out after {millis} ms")]
    Timeout {
        /// What was being waited for.
        stage: &'static str,
        /// The timeout that elapsed.
        millis: u64,
    },
}

/// Errors raised when the probe mechanism itself is broken.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The ICMP socket could not be created (often missing privileges).
    #[error("cannot create ICMP socket: {0}")]
    Socket(#[source] std::io::Error),

    /// Echo requests could not be sent.
    #[error("cannot send echo request: {0}")]
    Send(String),
}

/// Errors raised by an accessory binding.
#[derive(Debug, Error)]
pub enum BindingError {
    /// MQTT client error.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Broker address is malformed.
    #[error("invalid broker address: {0}")]
    InvalidAddress(String),

    /// The broker did not accept the connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
