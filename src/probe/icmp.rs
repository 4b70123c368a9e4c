// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ICMP echo prober.

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};

use super::{DEFAULT_PROBE_COUNT, ProbeReport, ReachabilityProber};
use crate::error::ProbeError;

/// Gap between consecutive echo requests.
const ECHO_SPACING: Duration = Duration::from_millis(100);

/// Payload carried by each echo request.
const PAYLOAD: [u8; 16] = *b"wolswitch-probe!";

/// Probes reachability with ICMP echo requests.
///
/// A fresh socket is opened for every probe so a transient socket error
/// does not poison later ticks.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use wolswitch::probe::{IcmpProber, ReachabilityProber};
///
/// # async fn example() -> Result<(), wolswitch::error::ProbeError> {
/// let prober = IcmpProber::new()
///     .with_count(3)
///     .with_timeout(Duration::from_secs(1))
///     .with_privileged(false);
///
/// let report = prober.probe("192.168.1.20".parse().unwrap()).await?;
/// println!("loss: {:.0}%", report.loss_ratio() * 100.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct IcmpProber {
    count: u32,
    timeout: Duration,
    privileged: bool,
}

impl IcmpProber {
    /// Creates a prober sending three privileged echoes with a 1 s timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: DEFAULT_PROBE_COUNT,
            timeout: Duration::from_secs(1),
            privileged: true,
        }
    }

    /// Sets the number of echo requests per probe (at least one).
    #[must_use]
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count.max(1);
        self
    }

    /// Sets how long to wait for each reply.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Chooses raw (privileged) or datagram ICMP sockets.
    #[must_use]
    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    fn client_config(&self, address: IpAddr) -> Config {
        let kind = match address {
            IpAddr::V4(_) => ICMP::V4,
            IpAddr::V6(_) => ICMP::V6,
        };
        let sock_type = if self.privileged {
            socket2::Type::RAW
        } else {
            socket2::Type::DGRAM
        };
        Config::builder().kind(kind).sock_type_hint(sock_type).build()
    }
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self::new()
    }
}

/// What a single echo told us.
enum EchoOutcome {
    Answered,
    Lost,
}

/// Errors raised by this host's network stack before the echo left it.
fn is_local_send_failure(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::NetworkDown
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::OutOfMemory
    )
}

fn classify(result: Result<(), SurgeError>) -> Result<EchoOutcome, ProbeError> {
    match result {
        Ok(()) => Ok(EchoOutcome::Answered),
        Err(SurgeError::Timeout { .. }) => Ok(EchoOutcome::Lost),
        Err(SurgeError::IOError(e)) if is_local_send_failure(e.kind()) => {
            Err(ProbeError::Send(e.to_string()))
        }
        Err(e) => {
            tracing::debug!(error = %e, "Echo request lost");
            Ok(EchoOutcome::Lost)
        }
    }
}

#[async_trait]
impl ReachabilityProber for IcmpProber {
    async fn probe(&self, address: IpAddr) -> Result<ProbeReport, ProbeError> {
        let client = Client::new(&self.client_config(address)).map_err(ProbeError::Socket)?;

        // Identifier only needs to be stable for this pinger.
        #[allow(clippy::cast_possible_truncation)]
        let ident = PingIdentifier((std::process::id() & 0xffff) as u16);
        let mut pinger = client.pinger(address, ident).await;
        pinger.timeout(self.timeout);

        let mut received = 0;
        for seq in 0..self.count {
            if seq > 0 {
                tokio::time::sleep(ECHO_SPACING).await;
            }

            #[allow(clippy::cast_possible_truncation)]
            let sequence = PingSequence(seq as u16);
            let result = pinger.ping(sequence, &PAYLOAD).await.map(|_| ());
            if let EchoOutcome::Answered = classify(result)? {
                received += 1;
            }
        }

        let report = ProbeReport::new(self.count, received);
        tracing::debug!(
            %address,
            transmitted = report.transmitted(),
            received = report.received(),
            "Probe finished"
        );
        Ok(report)
    }
}
