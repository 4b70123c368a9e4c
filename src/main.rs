// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `wolswitch` service entry point.

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wolswitch::action::{MagicPacketSender, RemoteSuspend, RusshShell};
use wolswitch::binding::MqttSwitch;
use wolswitch::config::Config;
use wolswitch::controller::PowerStateController;
use wolswitch::probe::IcmpProber;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> wolswitch::Result<()> {
    let config = Config::load(Config::locate()?)?;
    // Key problems must stop startup before anything is exposed.
    let target = config.machine_target()?;

    if let Some(pin) = &config.pin {
        tracing::info!(name = %config.name, %pin, "Accessory configured");
    }

    let wake = MagicPacketSender::with_target(config.broadcast);
    let shell = RusshShell::new()
        .with_connect_timeout(config.ssh_connect_timeout())
        .with_inactivity_timeout(config.ssh_session_timeout());
    let suspend = RemoteSuspend::new(shell)
        .with_command(config.suspend_command.clone())
        .with_timeout(config.ssh_session_timeout());
    let prober = IcmpProber::new()
        .with_count(config.probe_count)
        .with_timeout(config.probe_timeout())
        .with_privileged(config.privileged);

    let mut builder = MqttSwitch::builder()
        .broker(&config.mqtt.broker)
        .topic(&config.mqtt.topic);
    if let (Some(username), Some(password)) = (&config.mqtt.username, &config.mqtt.password) {
        builder = builder.credentials(username, password);
    }
    let switch = builder.build().await?;

    let controller = PowerStateController::new(
        target,
        Arc::new(wake),
        Arc::new(suspend),
        Arc::new(prober),
        Arc::new(switch),
    )
    .with_poll_interval(config.poll_interval())
    .attach();

    let poller = controller.spawn_poller();
    tracing::info!(name = %config.name, address = %controller.target().address, "Switch running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for shutdown signal");
    }
    tracing::info!("Shutting down");
    poller.abort();
    Ok(())
}
