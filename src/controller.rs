// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The power state controller.
//!
//! Two independent paths meet here:
//!
//! - **Toggles** arrive from the binding and trigger one power action each.
//!   They never touch the displayed state.
//! - **Probe ticks** run on their own task every poll interval and are the
//!   only writer of the displayed state.
//!
//! The displayed state is a single atomic. Whichever probe finishes last
//! wins; a stale value is corrected on the next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::action::{SuspendDispatcher, WakeDispatcher};
use crate::binding::{AccessoryBinding, ToggleHandler};
use crate::config::MachineTarget;
use crate::event::{EventBus, SwitchEvent};
use crate::probe::ReachabilityProber;

/// Default time between probe ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Bridges a machine's power state to an accessory binding.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use wolswitch::action::{MagicPacketSender, RemoteSuspend, RusshShell};
/// use wolswitch::binding::MemorySwitch;
/// use wolswitch::config::Config;
/// use wolswitch::controller::PowerStateController;
/// use wolswitch::probe::IcmpProber;
///
/// # async fn example(config: Config) -> wolswitch::Result<()> {
/// let controller = PowerStateController::new(
///     config.machine_target()?,
///     Arc::new(MagicPacketSender::new()),
///     Arc::new(RemoteSuspend::new(RusshShell::new())),
///     Arc::new(IcmpProber::new()),
///     Arc::new(MemorySwitch::new()),
/// )
/// .attach();
///
/// let poller = controller.spawn_poller();
/// # poller.abort();
/// # Ok(())
/// # }
/// ```
pub struct PowerStateController {
    target: MachineTarget,
    displayed: AtomicBool,
    poll_interval: Duration,
    wake: Arc<dyn WakeDispatcher>,
    suspend: Arc<dyn SuspendDispatcher>,
    prober: Arc<dyn ReachabilityProber>,
    binding: Arc<dyn AccessoryBinding>,
    events: EventBus,
}

impl PowerStateController {
    /// Creates a controller. The displayed state starts off.
    #[must_use]
    pub fn new(
        target: MachineTarget,
        wake: Arc<dyn WakeDispatcher>,
        suspend: Arc<dyn SuspendDispatcher>,
        prober: Arc<dyn ReachabilityProber>,
        binding: Arc<dyn AccessoryBinding>,
    ) -> Self {
        Self {
            target,
            displayed: AtomicBool::new(false),
            poll_interval: DEFAULT_POLL_INTERVAL,
            wake,
            suspend,
            prober,
            binding,
            events: EventBus::new(),
        }
    }

    /// Sets the time between probe ticks.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Publishes events to `events` instead of a private bus.
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Registers the controller as the binding's toggle handler.
    #[must_use]
    pub fn attach(self) -> Arc<Self> {
        let controller = Arc::new(self);
        let handler: Arc<dyn ToggleHandler> = controller.clone();
        controller.binding.attach(Arc::downgrade(&handler));
        controller
    }

    /// Returns the last state established by a probe.
    #[must_use]
    pub fn displayed_state(&self) -> bool {
        self.displayed.load(Ordering::Acquire)
    }

    /// Returns the machine this controller manages.
    #[must_use]
    pub fn target(&self) -> &MachineTarget {
        &self.target
    }

    /// Returns the time between probe ticks.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the controller's event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Probes the machine once and publishes the result.
    ///
    /// Returns the new displayed state, or `None` when the probe itself
    /// failed and the displayed state was left alone.
    pub async fn probe_tick(&self) -> Option<bool> {
        let address = self.target.address;
        let report = match self.prober.probe(address).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(%address, error = %e, "Probe failed, keeping displayed state");
                self.events.publish(SwitchEvent::probe_failed(&e));
                return None;
            }
        };

        let reachable = report.all_answered();
        self.displayed.store(reachable, Ordering::Release);
        tracing::debug!(
            %address,
            transmitted = report.transmitted(),
            received = report.received(),
            reachable,
            "Probe completed"
        );

        if let Err(e) = self.binding.set_on(reachable).await {
            tracing::warn!(error = %e, "Cannot update switch state");
        }

        self.events
            .publish(SwitchEvent::ProbeCompleted { report, reachable });
        Some(reachable)
    }

    /// Runs probe ticks forever. The first tick fires immediately.
    pub async fn run_poller(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            address = %self.target.address,
            interval_secs = self.poll_interval.as_secs(),
            "Starting reachability poller"
        );
        loop {
            interval.tick().await;
            self.probe_tick().await;
        }
    }

    /// Spawns [`run_poller`](Self::run_poller) on its own task.
    #[must_use]
    pub fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run_poller())
    }

    async fn wake_machine(&self) {
        let mac = &self.target.mac;
        match self.wake.wake(mac).await {
            Ok(()) => {
                tracing::info!(%mac, "Wake request sent");
                self.events.publish(SwitchEvent::WakeSent);
            }
            Err(e) => {
                tracing::warn!(%mac, error = %e, "Wake request failed");
                self.events.publish(SwitchEvent::wake_failed(&e));
            }
        }
    }

    async fn suspend_machine(&self) {
        let ssh = &self.target.ssh;
        match self.suspend.suspend(ssh).await {
            Ok(()) => {
                tracing::info!(host = %ssh.host, "Suspend command succeeded");
                self.events.publish(SwitchEvent::SuspendSucceeded);
            }
            Err(e) => {
                tracing::warn!(host = %ssh.host, error = %e, "Suspend failed");
                self.events.publish(SwitchEvent::suspend_failed(&e));
            }
        }
    }
}

impl std::fmt::Debug for PowerStateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerStateController")
            .field("target", &self.target)
            .field("displayed", &self.displayed_state())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ToggleHandler for PowerStateController {
    async fn on_toggle(&self, on: bool) {
        tracing::info!(on, address = %self.target.address, "Toggle requested");
        self.events.publish(SwitchEvent::ToggleRequested { on });

        if on {
            self.wake_machine().await;
        } else {
            self.suspend_machine().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use parking_lot::Mutex;

    use super::*;
    use crate::binding::MemorySwitch;
    use crate::config::{SshTarget, test_ssh_target};
    use crate::error::{ProbeError, SuspendError, WakeError};
    use crate::probe::ProbeReport;
    use crate::types::MacAddress;

    #[derive(Default)]
    struct FakeWake {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl WakeDispatcher for FakeWake {
        async fn wake(&self, _mac: &MacAddress) -> Result<(), WakeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WakeError::Socket(std::io::Error::other("no broadcast route")));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSuspend {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SuspendDispatcher for FakeSuspend {
        async fn suspend(&self, target: &SshTarget) -> Result<(), SuspendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SuspendError::AuthenticationFailed(target.user.clone()));
            }
            Ok(())
        }
    }

    /// Replays scripted outcomes, then reports full loss.
    #[derive(Default)]
    struct ScriptedProber {
        outcomes: Mutex<VecDeque<Result<ProbeReport, ProbeError>>>,
    }

    impl ScriptedProber {
        fn push(&self, outcome: Result<ProbeReport, ProbeError>) {
            self.outcomes.lock().push_back(outcome);
        }
    }

    #[async_trait]
    impl ReachabilityProber for ScriptedProber {
        async fn probe(&self, _address: std::net::IpAddr) -> Result<ProbeReport, ProbeError> {
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or(Ok(ProbeReport::new(3, 0)))
        }
    }

    fn target() -> MachineTarget {
        MachineTarget {
            address: "192.0.2.10".parse().unwrap(),
            mac: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            ssh: test_ssh_target(),
        }
    }

    struct Fixture {
        wake: Arc<FakeWake>,
        suspend: Arc<FakeSuspend>,
        prober: Arc<ScriptedProber>,
        switch: MemorySwitch,
        controller: Arc<PowerStateController>,
    }

    fn fixture(wake_fails: bool, suspend_fails: bool) -> Fixture {
        let wake = Arc::new(FakeWake {
            fail: wake_fails,
            ..FakeWake::default()
        });
        let suspend = Arc::new(FakeSuspend {
            fail: suspend_fails,
            ..FakeSuspend::default()
        });
        let prober = Arc::new(ScriptedProber::default());
        let switch = MemorySwitch::new();
        let controller = PowerStateController::new(
            target(),
            wake.clone(),
            suspend.clone(),
            prober.clone(),
            Arc::new(switch.clone()),
        )
        .attach();

        Fixture {
            wake,
            suspend,
            prober,
            switch,
            controller,
        }
    }

    #[tokio::test]
    async fn zero_loss_shows_on() {
        let f = fixture(false, false);
        f.prober.push(Ok(ProbeReport::new(3, 3)));

        assert_eq!(f.controller.probe_tick().await, Some(true));
        assert!(f.controller.displayed_state());
        assert!(f.switch.is_on());
    }

    #[tokio::test]
    async fn any_loss_shows_off() {
        for received in 0..3 {
            let f = fixture(false, false);
            f.prober.push(Ok(ProbeReport::new(3, 3)));
            f.prober.push(Ok(ProbeReport::new(3, received)));

            f.controller.probe_tick().await;
            assert_eq!(f.controller.probe_tick().await, Some(false));
            assert!(!f.controller.displayed_state(), "received {received}/3");
            assert!(!f.switch.is_on());
        }
    }

    #[tokio::test]
    async fn probe_error_keeps_previous_state() {
        for prior in [true, false] {
            let f = fixture(false, false);
            let received = if prior { 3 } else { 0 };
            f.prober.push(Ok(ProbeReport::new(3, received)));
            f.prober
                .push(Err(ProbeError::Send("operation not permitted".to_string())));

            f.controller.probe_tick().await;
            assert_eq!(f.controller.probe_tick().await, None);
            assert_eq!(f.controller.displayed_state(), prior);
            assert_eq!(f.switch.is_on(), prior);
        }
    }

    #[tokio::test]
    async fn toggle_on_wakes_once_without_touching_state() {
        let f = fixture(false, false);
        f.controller.on_toggle(true).await;

        assert_eq!(f.wake.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.suspend.calls.load(Ordering::SeqCst), 0);
        assert!(!f.controller.displayed_state());
    }

    #[tokio::test]
    async fn failed_actions_do_not_change_state() {
        let f = fixture(true, true);
        f.prober.push(Ok(ProbeReport::new(3, 3)));
        f.controller.probe_tick().await;

        f.controller.on_toggle(true).await;
        f.controller.on_toggle(false).await;

        assert_eq!(f.wake.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.suspend.calls.load(Ordering::SeqCst), 1);
        assert!(f.controller.displayed_state());
    }

    #[tokio::test]
    async fn events_report_outcomes() {
        let f = fixture(true, false);
        let mut rx = f.controller.events().subscribe();

        f.controller.on_toggle(true).await;
        assert_eq!(
            rx.recv().await.unwrap(),
            SwitchEvent::ToggleRequested { on: true }
        );
        assert!(matches!(rx.recv().await.unwrap(), SwitchEvent::WakeFailed { .. }));

        f.controller.on_toggle(false).await;
        assert_eq!(
            rx.recv().await.unwrap(),
            SwitchEvent::ToggleRequested { on: false }
        );
        assert_eq!(rx.recv().await.unwrap(), SwitchEvent::SuspendSucceeded);
    }

    #[tokio::test]
    async fn binding_toggle_reaches_controller() {
        let f = fixture(false, false);

        f.switch.toggle(false).unwrap().await.unwrap();
        assert_eq!(f.suspend.calls.load(Ordering::SeqCst), 1);
    }
}
