// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast bus for [`SwitchEvent`]s.

use tokio::sync::broadcast;

use super::SwitchEvent;

/// Buffered events per subscriber before the oldest are dropped.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Fan-out of controller events to any number of subscribers.
///
/// Backed by a tokio broadcast channel. A subscriber that falls more than
/// the channel capacity behind receives `RecvError::Lagged` and skips the
/// oldest events; the controller is never slowed down by a subscriber.
///
/// Clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SwitchEvent>,
}

impl EventBus {
    /// Creates a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns a receiver for every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SwitchEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of live receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event. Dropped silently when nobody is subscribed.
    pub fn publish(&self, event: SwitchEvent) {
        tracing::trace!(?event, "Publishing switch event");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
