// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SSH sessions backed by `russh`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect};

use super::suspend::{RemoteShell, ShellSession};
use crate::config::SshTarget;
use crate::error::SuspendError;

/// Accepts any server host key.
///
/// The machine is addressed by IP on the local network and no known-hosts
/// store is configured, so the host key is not pinned.
#[derive(Debug)]
pub struct AcceptAnyHostKey;

impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        tracing::trace!("Accepting server host key");
        Ok(true)
    }
}

/// Opens SSH sessions with public-key authentication.
#[derive(Clone)]
pub struct RusshShell {
    config: Arc<client::Config>,
    connect_timeout: Duration,
}

impl RusshShell {
    /// Creates a shell with a 10 s connect timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Arc::new(client::Config::default()),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the TCP connect and handshake timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Drops sessions that see no traffic for `timeout`.
    #[must_use]
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.config = Arc::new(client::Config {
            inactivity_timeout: Some(timeout),
            ..client::Config::default()
        });
        self
    }

    async fn connect(&self, target: &SshTarget) -> Result<Handle<AcceptAnyHostKey>, SuspendError> {
        let connect = client::connect(
            Arc::clone(&self.config),
            (target.host.clone(), target.port),
            AcceptAnyHostKey,
        );

        tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| SuspendError::Timeout {
                stage: "connect",
                millis: u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| SuspendError::Connect {
                host: target.host.clone(),
                port: target.port,
                message: e.to_string(),
            })
    }
}

impl Default for RusshShell {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RusshShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusshShell")
            .field("connect_timeout", &self.connect_timeout)
            .field("inactivity_timeout", &self.config.inactivity_timeout)
            .finish()
    }
}

fn session_error(e: &russh::Error) -> SuspendError {
    SuspendError::Session(e.to_string())
}

#[async_trait]
impl RemoteShell for RusshShell {
    type Session = RusshSession;

    async fn open(&self, target: &SshTarget) -> Result<RusshSession, SuspendError> {
        let mut session = RusshSession {
            handle: self.connect(target).await?,
        };

        match session.authenticate(target).await {
            Ok(true) => {
                tracing::debug!(host = %target.host, user = %target.user, "SSH session established");
                Ok(session)
            }
            Ok(false) => {
                session.close_quietly(&target.host).await;
                Err(SuspendError::AuthenticationFailed(target.user.clone()))
            }
            Err(e) => {
                session.close_quietly(&target.host).await;
                Err(e)
            }
        }
    }
}

/// An authenticated SSH connection.
pub struct RusshSession {
    handle: Handle<AcceptAnyHostKey>,
}

impl RusshSession {
    async fn authenticate(&mut self, target: &SshTarget) -> Result<bool, SuspendError> {
        let hash_alg = self
            .handle
            .best_supported_rsa_hash()
            .await
            .map_err(|e| session_error(&e))?
            .flatten();
        let key = PrivateKeyWithHashAlg::new(Arc::clone(&target.key), hash_alg);

        let auth = self
            .handle
            .authenticate_publickey(target.user.clone(), key)
            .await
            .map_err(|e| session_error(&e))?;
        Ok(auth.success())
    }

    async fn close_quietly(&mut self, host: &str) {
        if let Err(e) = self.close().await {
            tracing::debug!(%host, error = %e, "Closing SSH connection failed");
        }
    }
}

#[async_trait]
impl ShellSession for RusshSession {
    async fn exec(&mut self, command: &str) -> Result<Option<u32>, SuspendError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| session_error(&e))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| session_error(&e))?;

        let mut status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status),
                ChannelMsg::Data { ref data } => {
                    tracing::debug!(output = %String::from_utf8_lossy(data), "Remote stdout");
                }
                ChannelMsg::ExtendedData { ref data, .. } => {
                    tracing::debug!(output = %String::from_utf8_lossy(data), "Remote stderr");
                }
                _ => {}
            }
        }

        Ok(status)
    }

    async fn close(&mut self) -> Result<(), SuspendError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| session_error(&e))
    }
}
