// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration loading.
//!
//! The configuration is a small YAML file. Only the machine fields are
//! required; everything else has a default:
//!
//! ```yaml
//! ip: 192.168.1.20
//! mac: "aa:bb:cc:dd:ee:ff"
//! keyfile: /home/pi/.ssh/id_ed25519
//! user: alice
//! port: "22"
//! pin: "031-45-154"
//!
//! # optional
//! name: Desktop PC
//! poll_interval_secs: 10
//! mqtt:
//!   broker: mqtt://192.168.1.50:1883
//!   topic: wolswitch/desktop
//! ```
//!
//! [`Config::machine_target`] turns the file into a [`MachineTarget`],
//! reading and decoding the private key on the way. Any failure here is a
//! [`ConfigError`] and is fatal.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use russh::keys::PrivateKey;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::types::{MacAddress, PairingPin};

/// Environment variable that overrides the configuration file location.
pub const CONFIG_ENV: &str = "WOLSWITCH_CONFIG";

/// File name looked up next to the executable.
pub const CONFIG_FILE_NAME: &str = "config.yml";

/// Default suspend command.
pub const DEFAULT_SUSPEND_COMMAND: &str = "sudo systemctl suspend";

/// Raw configuration as read from disk.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Network address of the machine.
    pub ip: IpAddr,
    /// Hardware address used for Wake-on-LAN.
    pub mac: MacAddress,
    /// Path to the SSH private key.
    pub keyfile: PathBuf,
    /// SSH user on the machine.
    pub user: String,
    /// SSH port. Accepted as a string (`"22"`) or an integer.
    #[serde(default = "default_port", deserialize_with = "deserialize_port")]
    pub port: u16,
    /// Accessory pairing PIN.
    #[serde(default)]
    pub pin: Option<PairingPin>,
    /// Display name of the switch.
    #[serde(default = "default_name")]
    pub name: String,
    /// Seconds between reachability probes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Echo requests per probe.
    #[serde(default = "default_probe_count")]
    pub probe_count: u32,
    /// How long to wait for each echo reply.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Use raw ICMP sockets (requires `CAP_NET_RAW` or root).
    #[serde(default = "default_true")]
    pub privileged: bool,
    /// Command run over SSH to suspend the machine.
    #[serde(default = "default_suspend_command")]
    pub suspend_command: String,
    /// SSH connect and handshake timeout.
    #[serde(default = "default_ssh_connect_timeout_secs")]
    pub ssh_connect_timeout_secs: u64,
    /// Timeout for the whole suspend session.
    #[serde(default = "default_ssh_session_timeout_secs")]
    pub ssh_session_timeout_secs: u64,
    /// Destination of the magic packet.
    #[serde(default = "default_broadcast")]
    pub broadcast: SocketAddr,
    /// MQTT binding settings.
    #[serde(default)]
    pub mqtt: MqttSettings,
}

/// MQTT binding section.
#[derive(Clone, Deserialize)]
pub struct MqttSettings {
    /// Broker URL, e.g. `mqtt://192.168.1.50:1883`.
    #[serde(default = "default_broker")]
    pub broker: String,
    /// Base topic of the switch.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Broker username.
    #[serde(default)]
    pub username: Option<String>,
    /// Broker password.
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            topic: default_topic(),
            username: None,
            password: None,
        }
    }
}

impl fmt::Debug for MqttSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttSettings")
            .field("broker", &self.broker)
            .field("topic", &self.topic)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

fn default_port() -> u16 {
    22
}

fn default_name() -> String {
    "PC WakeOnLan".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_probe_count() -> u32 {
    3
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_suspend_command() -> String {
    DEFAULT_SUSPEND_COMMAND.to_string()
}

fn default_ssh_connect_timeout_secs() -> u64 {
    10
}

fn default_ssh_session_timeout_secs() -> u64 {
    30
}

fn default_broadcast() -> SocketAddr {
    SocketAddr::from(([255, 255, 255, 255], 9))
}

fn default_broker() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_topic() -> String {
    "wolswitch/pc".to_string()
}

fn deserialize_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {text}"))),
    }
}

impl Config {
    /// Parses a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML or bad field
    /// values, and [`ConfigError::InvalidField`] for values that parse but
    /// are unusable.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise
    /// the same errors as [`Config::from_yaml`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text)?;
        tracing::info!(path = %path.display(), name = %config.name, "Loaded configuration");
        Ok(config)
    }

    /// Returns the configuration file location.
    ///
    /// Uses `$WOLSWITCH_CONFIG` when set, otherwise `config.yml` in the
    /// directory of the running executable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Locate`] if the executable path is unknown.
    pub fn locate() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }

        let exe = std::env::current_exe().map_err(|e| ConfigError::Locate(e.to_string()))?;
        let dir = exe
            .parent()
            .ok_or_else(|| ConfigError::Locate(format!("{} has no parent", exe.display())))?;
        Ok(dir.join(CONFIG_FILE_NAME))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.user.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "user",
                message: "must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidField {
                field: "port",
                message: "must be between 1 and 65535".to_string(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidField {
                field: "poll_interval_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if self.probe_count == 0 {
            return Err(ConfigError::InvalidField {
                field: "probe_count",
                message: "must be at least 1".to_string(),
            });
        }
        if self.suspend_command.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "suspend_command",
                message: "must not be empty".to_string(),
            });
        }
        if self.mqtt.topic.trim_matches('/').is_empty() {
            return Err(ConfigError::InvalidField {
                field: "mqtt.topic",
                message: "must not be empty".to_string(),
            });
        }
        if self.mqtt.username.is_some() != self.mqtt.password.is_some() {
            return Err(ConfigError::InvalidField {
                field: "mqtt.username",
                message: "username and password must be set together".to_string(),
            });
        }
        Ok(())
    }

    /// Poll cadence of the reachability probe.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Per-echo reply timeout.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// SSH connect timeout.
    #[must_use]
    pub fn ssh_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_connect_timeout_secs)
    }

    /// Timeout for a whole suspend session.
    #[must_use]
    pub fn ssh_session_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_session_timeout_secs)
    }

    /// Builds the machine identity, loading the private key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the key file cannot be read and
    /// [`ConfigError::Credential`] if it cannot be decoded.
    pub fn machine_target(&self) -> Result<MachineTarget, ConfigError> {
        let key = load_private_key(&self.keyfile)?;
        Ok(MachineTarget {
            address: self.ip,
            mac: self.mac,
            ssh: SshTarget {
                host: self.ip.to_string(),
                port: self.port,
                user: self.user.clone(),
                key: Arc::new(key),
            },
        })
    }
}

/// Reads and decodes an unencrypted private key file.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] or [`ConfigError::Credential`].
pub fn load_private_key(path: &Path) -> Result<PrivateKey, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_private_key(&text).map_err(|message| ConfigError::Credential {
        path: path.to_path_buf(),
        message,
    })
}

fn decode_private_key(text: &str) -> Result<PrivateKey, String> {
    russh::keys::decode_secret_key(text, None).map_err(|e| e.to_string())
}

/// Identity of the remote machine.
#[derive(Debug, Clone)]
pub struct MachineTarget {
    /// Address probed for reachability.
    pub address: IpAddr,
    /// Wake-on-LAN hardware address.
    pub mac: MacAddress,
    /// SSH credentials for suspend.
    pub ssh: SshTarget,
}

/// Where and how to open the suspend session.
#[derive(Clone)]
pub struct SshTarget {
    /// Remote host.
    pub host: String,
    /// Remote SSH port.
    pub port: u16,
    /// Remote user.
    pub user: String,
    /// Decoded private key.
    pub key: Arc<PrivateKey>,
}

impl fmt::Debug for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) const TEST_KEY: &str = include_str!("../tests/fixtures/test_ed25519");

#[cfg(test)]
pub(crate) fn test_ssh_target() -> SshTarget {
    let key = decode_private_key(TEST_KEY).expect("fixture key decodes");
    SshTarget {
        host: "192.0.2.10".to_string(),
        port: 22,
        user: "alice".to_string(),
        key: Arc::new(key),
    }
}
