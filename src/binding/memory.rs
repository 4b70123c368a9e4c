// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process switch.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{AccessoryBinding, ToggleHandler};
use crate::error::BindingError;

/// A switch living in the same process.
///
/// Holds the displayed value in a watch channel so callers can observe
/// every change. [`MemorySwitch::toggle`] plays the part of a user flipping
/// the switch.
///
/// Clones share the same state.
///
/// # Examples
///
/// ```
/// use wolswitch::binding::{AccessoryBinding, MemorySwitch};
///
/// # async fn example() {
/// let switch = MemorySwitch::new();
/// switch.set_on(true).await.unwrap();
/// assert!(switch.is_on());
/// # }
/// ```
#[derive(Clone)]
pub struct MemorySwitch {
    state: Arc<watch::Sender<bool>>,
    handler: Arc<RwLock<Option<Weak<dyn ToggleHandler>>>>,
}

impl MemorySwitch {
    /// Creates a switch that starts off.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
            handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns the displayed value.
    #[must_use]
    pub fn is_on(&self) -> bool {
        *self.state.borrow()
    }

    /// Returns a receiver notified on every displayed-value write.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Simulates a user toggle.
    ///
    /// Shows `on` immediately, then runs the handler on its own task.
    /// Returns `None` when no live handler is attached.
    pub fn toggle(&self, on: bool) -> Option<JoinHandle<()>> {
        self.state.send_replace(on);

        let handler = self.handler.read().as_ref().and_then(Weak::upgrade)?;
        Some(tokio::spawn(async move { handler.on_toggle(on).await }))
    }
}

impl Default for MemorySwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemorySwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySwitch")
            .field("on", &self.is_on())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AccessoryBinding for MemorySwitch {
    fn attach(&self, handler: Weak<dyn ToggleHandler>) {
        *self.handler.write() = Some(handler);
    }

    async fn set_on(&self, on: bool) -> Result<(), BindingError> {
        self.state.send_replace(on);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        ons: AtomicUsize,
        offs: AtomicUsize,
    }

    #[async_trait]
    impl ToggleHandler for Recorder {
        async fn on_toggle(&self, on: bool) {
            if on {
                self.ons.fetch_add(1, Ordering::SeqCst);
            } else {
                self.offs.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn toggle_shows_value_and_calls_handler() {
        let switch = MemorySwitch::new();
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn ToggleHandler> = Arc::downgrade(&recorder) as Weak<dyn ToggleHandler>;
        switch.attach(weak);

        switch.toggle(true).unwrap().await.unwrap();
        assert!(switch.is_on());
        assert_eq!(recorder.ons.load(Ordering::SeqCst), 1);

        switch.toggle(false).unwrap().await.unwrap();
        assert!(!switch.is_on());
        assert_eq!(recorder.offs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn toggle_without_handler_only_updates_value() {
        let switch = MemorySwitch::new();
        assert!(switch.toggle(true).is_none());
        assert!(switch.is_on());
    }

    #[tokio::test]
    async fn dropped_handler_is_not_called() {
        let switch = MemorySwitch::new();
        let recorder = Arc::new(Recorder::default());
        switch.attach(Arc::downgrade(&recorder) as Weak<dyn ToggleHandler>);
        drop(recorder);

        assert!(switch.toggle(true).is_none());
    }

    #[tokio::test]
    async fn set_on_notifies_subscribers() {
        let switch = MemorySwitch::new();
        let mut rx = switch.subscribe();

        switch.set_on(true).await.unwrap();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
