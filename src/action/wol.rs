// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wake-on-LAN magic packets.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::WakeDispatcher;
use crate::error::WakeError;
use crate::types::MacAddress;

/// Length of a magic packet: 6 sync bytes plus 16 copies of the MAC.
pub const MAGIC_PACKET_LEN: usize = 6 + 16 * 6;

/// A Wake-on-LAN magic packet.
///
/// # Examples
///
/// ```
/// use wolswitch::action::MagicPacket;
/// use wolswitch::types::MacAddress;
///
/// let mac: MacAddress = "01:02:03:04:05:06".parse().unwrap();
/// let packet = MagicPacket::new(mac);
///
/// assert_eq!(packet.as_bytes().len(), 102);
/// assert_eq!(&packet.as_bytes()[..6], &[0xff; 6]);
/// assert_eq!(&packet.as_bytes()[6..12], &[1, 2, 3, 4, 5, 6]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicPacket([u8; MAGIC_PACKET_LEN]);

impl MagicPacket {
    /// Builds the packet for `mac`.
    #[must_use]
    pub fn new(mac: MacAddress) -> Self {
        let mut bytes = [0xff; MAGIC_PACKET_LEN];
        let octets = mac.octets();
        for chunk in bytes[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&octets);
        }
        Self(bytes)
    }

    /// Returns the raw packet.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; MAGIC_PACKET_LEN] {
        &self.0
    }
}

/// Broadcasts magic packets over UDP.
///
/// Sends a single datagram per wake request; there is no acknowledgement
/// and no retry.
#[derive(Debug, Clone)]
pub struct MagicPacketSender {
    target: SocketAddr,
}

impl MagicPacketSender {
    /// Default destination: limited broadcast, discard port.
    pub const DEFAULT_TARGET: SocketAddr =
        SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::BROADCAST), 9);

    /// Creates a sender for the limited broadcast address.
    #[must_use]
    pub fn new() -> Self {
        Self::with_target(Self::DEFAULT_TARGET)
    }

    /// Creates a sender for a specific destination (e.g. a subnet
    /// broadcast address).
    #[must_use]
    pub fn with_target(target: SocketAddr) -> Self {
        Self { target }
    }

    /// Returns the destination address.
    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    fn bind_address(&self) -> SocketAddr {
        match self.target {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        }
    }
}

impl Default for MagicPacketSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WakeDispatcher for MagicPacketSender {
    async fn wake(&self, mac: &MacAddress) -> Result<(), WakeError> {
        let packet = MagicPacket::new(*mac);

        let socket = UdpSocket::bind(self.bind_address())
            .await
            .map_err(WakeError::Socket)?;
        socket.set_broadcast(true).map_err(WakeError::Socket)?;

        let written = socket
            .send_to(packet.as_bytes(), self.target)
            .await
            .map_err(|source| WakeError::Send {
                target: self.target,
                source,
            })?;
        if written != MAGIC_PACKET_LEN {
            return Err(WakeError::ShortWrite {
                written,
                expected: MAGIC_PACKET_LEN,
            });
        }

        tracing::debug!(%mac, target = %self.target, "Magic packet sent");
        Ok(())
    }
}
