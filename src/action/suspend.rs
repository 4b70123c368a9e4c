// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Suspend through a remote shell session.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::SuspendDispatcher;
use crate::config::{DEFAULT_SUSPEND_COMMAND, SshTarget};
use crate::error::SuspendError;

/// Upper bound on the disconnect after the command has finished.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens authenticated sessions on a remote machine.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Session type produced by [`RemoteShell::open`].
    type Session: ShellSession;

    /// Connects and authenticates.
    ///
    /// # Errors
    ///
    /// Returns [`SuspendError`] if the connection or authentication fails.
    async fn open(&self, target: &SshTarget) -> Result<Self::Session, SuspendError>;
}

/// An open remote session.
#[async_trait]
pub trait ShellSession: Send {
    /// Runs `command` and waits for it to finish.
    ///
    /// Returns the exit status, or `None` if the channel closed without
    /// reporting one.
    ///
    /// # Errors
    ///
    /// Returns [`SuspendError::Session`] on protocol failures.
    async fn exec(&mut self, command: &str) -> Result<Option<u32>, SuspendError>;

    /// Closes the session.
    ///
    /// # Errors
    ///
    /// Returns [`SuspendError::Session`] if the disconnect could not be
    /// sent.
    async fn close(&mut self) -> Result<(), SuspendError>;
}

/// Suspends a machine by running one command over a [`RemoteShell`].
///
/// Every attempt opens exactly one session and closes it again, whether
/// the command succeeded, failed or ran past the session timeout. The
/// timeout covers connecting and running the command.
#[derive(Debug, Clone)]
pub struct RemoteSuspend<S> {
    shell: S,
    command: String,
    timeout: Duration,
}

impl<S: RemoteShell> RemoteSuspend<S> {
    /// Creates a dispatcher running `sudo systemctl suspend` with a 30 s
    /// session timeout.
    #[must_use]
    pub fn new(shell: S) -> Self {
        Self {
            shell,
            command: DEFAULT_SUSPEND_COMMAND.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the command run on the remote machine.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Sets the timeout for the whole attempt.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the remote command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    fn timeout_error(&self, stage: &'static str) -> SuspendError {
        SuspendError::Timeout {
            stage,
            millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[async_trait]
impl<S: RemoteShell> SuspendDispatcher for RemoteSuspend<S> {
    async fn suspend(&self, target: &SshTarget) -> Result<(), SuspendError> {
        tracing::debug!(
            host = %target.host,
            port = target.port,
            user = %target.user,
            command = %self.command,
            "Running remote suspend"
        );

        let deadline = Instant::now() + self.timeout;
        let mut session = tokio::time::timeout_at(deadline, self.shell.open(target))
            .await
            .map_err(|_| self.timeout_error("open session"))??;

        let exec = tokio::time::timeout_at(deadline, session.exec(&self.command))
            .await
            .map_err(|_| self.timeout_error("suspend command"))
            .and_then(|result| result);

        match tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await {
            Ok(Ok(())) => {}
            // The machine may already be going down and drop the connection.
            Ok(Err(e)) => {
                tracing::debug!(host = %target.host, error = %e, "Closing suspend session failed");
            }
            Err(_) => tracing::debug!(host = %target.host, "Closing suspend session timed out"),
        }

        match exec? {
            Some(0) | None => Ok(()),
            Some(status) => Err(SuspendError::CommandFailed {
                command: self.command.clone(),
                status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::test_ssh_target;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        executed: AtomicUsize,
        closed: AtomicUsize,
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Exit(Option<u32>),
        ExecError,
        OpenError,
        Hang,
    }

    struct FakeShell {
        counters: Arc<Counters>,
        behavior: Behavior,
    }

    struct FakeSession {
        counters: Arc<Counters>,
        behavior: Behavior,
    }

    #[async_trait]
    impl RemoteShell for FakeShell {
        type Session = FakeSession;

        async fn open(&self, target: &SshTarget) -> Result<FakeSession, SuspendError> {
            if let Behavior::OpenError = self.behavior {
                return Err(SuspendError::Connect {
                    host: target.host.clone(),
                    port: target.port,
                    message: "refused".to_string(),
                });
            }
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSession {
                counters: Arc::clone(&self.counters),
                behavior: self.behavior,
            })
        }
    }

    #[async_trait]
    impl ShellSession for FakeSession {
        async fn exec(&mut self, _command: &str) -> Result<Option<u32>, SuspendError> {
            self.counters.executed.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Exit(status) => Ok(status),
                Behavior::ExecError => Err(SuspendError::Session("channel reset".to_string())),
                Behavior::Hang => std::future::pending().await,
                Behavior::OpenError => unreachable!(),
            }
        }

        async fn close(&mut self) -> Result<(), SuspendError> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn target() -> SshTarget {
        test_ssh_target()
    }

    fn dispatcher(behavior: Behavior) -> (RemoteSuspend<FakeShell>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let shell = FakeShell {
            counters: Arc::clone(&counters),
            behavior,
        };
        (RemoteSuspend::new(shell), counters)
    }

    fn counts(c: &Counters) -> (usize, usize, usize) {
        (
            c.opened.load(Ordering::SeqCst),
            c.executed.load(Ordering::SeqCst),
            c.closed.load(Ordering::SeqCst),
        )
    }

    #[tokio::test]
    async fn success_opens_runs_and_closes_once() {
        let (suspend, counters) = dispatcher(Behavior::Exit(Some(0)));
        suspend.suspend(&target()).await.unwrap();
        assert_eq!(counts(&counters), (1, 1, 1));
    }

    #[tokio::test]
    async fn missing_exit_status_is_success() {
        let (suspend, counters) = dispatcher(Behavior::Exit(None));
        suspend.suspend(&target()).await.unwrap();
        assert_eq!(counts(&counters), (1, 1, 1));
    }

    #[tokio::test]
    async fn non_zero_exit_still_closes_session() {
        let (suspend, counters) = dispatcher(Behavior::Exit(Some(1)));
        let err = suspend.suspend(&target()).await.unwrap_err();
        assert!(matches!(err, SuspendError::CommandFailed { status: 1, .. }));
        assert_eq!(counts(&counters), (1, 1, 1));
    }

    #[tokio::test]
    async fn exec_error_still_closes_session() {
        let (suspend, counters) = dispatcher(Behavior::ExecError);
        let err = suspend.suspend(&target()).await.unwrap_err();
        assert!(matches!(err, SuspendError::Session(_)));
        assert_eq!(counts(&counters), (1, 1, 1));
    }

    #[tokio::test]
    async fn connect_error_runs_nothing() {
        let (suspend, counters) = dispatcher(Behavior::OpenError);
        let err = suspend.suspend(&target()).await.unwrap_err();
        assert!(matches!(err, SuspendError::Connect { .. }));
        assert_eq!(counts(&counters), (0, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_session_times_out() {
        let (suspend, counters) = dispatcher(Behavior::Hang);
        let suspend = suspend.with_timeout(Duration::from_secs(5));

        let err = suspend.suspend(&target()).await.unwrap_err();
        assert!(matches!(
            err,
            SuspendError::Timeout {
                stage: "suspend command",
                millis: 5000
            }
        ));
        assert_eq!(counts(&counters), (1, 1, 1));
    }

    #[test]
    fn command_is_configurable() {
        let (suspend, _) = dispatcher(Behavior::Exit(Some(0)));
        assert_eq!(suspend.command(), "sudo systemctl suspend");
        let suspend = suspend.with_command("systemctl hibernate");
        assert_eq!(suspend.command(), "systemctl hibernate");
    }
}
