//! Remote hosts, their connections and everything that runs over them.
//!
//! A [`RemoteHost`] owns at most one SSH transport, dialled lazily on first
//! use. Every operation opens a fresh channel (a "session") on that
//! transport, runs exactly one remote command on it and closes it again.
//!
//! # Main Components
//!
//! - [`RemoteHost`] - One remote host: identity, credential, connection state
//! - [`ExecContext`] - Formatter and cancellation token threaded through calls
//! - [`HostGroup`] - Concurrent fan-out over several hosts
//! - [`HostSpec`] / [`Inventory`] - Serde descriptions of hosts

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use log::{debug, trace, warn};
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, Preferred};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config;
use crate::error::{ExitReport, RemoteError};
use crate::formatter::{BasicFormatter, Formatter};

use transport::Transport;

pub use channel::Session;
pub use exec::{StreamKind, drain_lines};
pub use group::{GroupResults, HostGroup, HostOutcome, execute_on_group, execute_on_group_func};
pub use security::{ConnectionSecurityOptions, SecurityLevel};

/// Password and/or private key used to authenticate a host.
///
/// Empty strings count as absent. When both are present the key is used.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub password: Option<String>,
    pub key_file: Option<PathBuf>,
    pub key_passphrase: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_file", &self.key_file)
            .field(
                "key_passphrase",
                &self.key_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// The single method a [`Credentials`] value resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChoice<'a> {
    Password(&'a str),
    KeyFile {
        path: &'a Path,
        passphrase: Option<&'a str>,
    },
}

impl Credentials {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Default::default()
        }
    }

    pub fn key_file(path: impl Into<PathBuf>) -> Self {
        Self {
            key_file: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.key_passphrase = Some(passphrase.into());
        self
    }

    /// Picks the method used to authenticate, or `None` when both are empty.
    pub fn choice(&self) -> Option<AuthChoice<'_>> {
        let passphrase = self.key_passphrase.as_deref().filter(|p| !p.is_empty());
        if let Some(path) = self.key_file.as_deref().filter(|p| !p.as_os_str().is_empty()) {
            return Some(AuthChoice::KeyFile { path, passphrase });
        }
        self.password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(AuthChoice::Password)
    }

    fn auth_method(&self) -> Option<AuthMethod> {
        match self.choice()? {
            AuthChoice::Password(password) => Some(AuthMethod::with_password(password)),
            AuthChoice::KeyFile { path, passphrase } => {
                Some(AuthMethod::with_key_file(path, passphrase))
            }
        }
    }
}

fn default_port() -> u16 {
    config::DEFAULT_PORT
}

/// Serializable description of one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HostSpec {
    /// Hostname or IP address.
    pub address: String,
    /// SSH port, 22 when omitted.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Password credential.
    #[serde(default)]
    pub password: Option<String>,
    /// Private key file; takes precedence over `password`.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Passphrase for `key_file`.
    #[serde(default)]
    pub key_passphrase: Option<String>,
    /// Algorithm profile.
    #[serde(default)]
    pub security: SecurityLevel,
    /// Verify the server key against the user's known_hosts file.
    #[serde(default)]
    pub strict_host_key_checking: bool,
    /// Remote scp binary, `/usr/bin/scp` when omitted.
    #[serde(default)]
    pub scp_path: Option<String>,
    /// Free-form metadata attached to the host.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl HostSpec {
    pub fn new(address: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: config::DEFAULT_PORT,
            user: user.into(),
            password: None,
            key_file: None,
            key_passphrase: None,
            security: SecurityLevel::default(),
            strict_host_key_checking: false,
            scp_path: None,
            properties: HashMap::new(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            password: self.password.clone(),
            key_file: self.key_file.clone(),
            key_passphrase: self.key_passphrase.clone(),
        }
    }

    fn options(&self) -> HostOptions {
        let mut security = ConnectionSecurityOptions::with_level(self.security);
        if self.strict_host_key_checking {
            security.server_check = ServerCheckMethod::DefaultKnownHostsFile;
        }
        HostOptions {
            security,
            scp_path: self
                .scp_path
                .clone()
                .unwrap_or_else(|| config::DEFAULT_SCP_PATH.to_string()),
            inactivity_timeout: None,
        }
    }
}

/// A list of hosts, usually loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Inventory {
    pub hosts: Vec<HostSpec>,
}

impl Inventory {
    pub fn from_json(json: &str) -> Result<Self, RemoteError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, RemoteError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON schema describing inventory documents.
    pub fn schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Inventory)).unwrap_or_default()
    }
}

/// Connection settings that are not part of a host's identity.
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub security: ConnectionSecurityOptions,
    /// Remote scp binary used for transfers.
    pub scp_path: String,
    /// Drop the transport after this long without traffic. Off by default.
    pub inactivity_timeout: Option<Duration>,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            security: ConnectionSecurityOptions::default(),
            scp_path: config::DEFAULT_SCP_PATH.to_string(),
            inactivity_timeout: None,
        }
    }
}

/// Formatter and cancellation token used by every call on a host.
#[derive(Clone)]
pub struct ExecContext {
    formatter: Arc<dyn Formatter>,
    cancel: CancellationToken,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new(Arc::new(BasicFormatter))
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ExecContext {
    pub fn new(formatter: Arc<dyn Formatter>) -> Self {
        Self {
            formatter,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_formatter<F: Formatter + 'static>(formatter: F) -> Self {
        Self::new(Arc::new(formatter))
    }

    /// Replaces the cancellation token, e.g. with a child of a group token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn formatter(&self) -> &Arc<dyn Formatter> {
        &self.formatter
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels every in-flight and future operation using this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// How a host's transport is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Dial the host's address directly.
    Direct,
    /// Tunnelled through another host; cannot be re-dialled once closed.
    Tunneled,
}

/// One remote host and its lazily established connection.
pub struct RemoteHost {
    address: String,
    port: u16,
    user: String,
    credentials: Credentials,
    id: String,
    options: HostOptions,
    ctx: ExecContext,
    properties: HashMap<String, String>,
    route: Route,
    transport: Mutex<Option<Arc<Transport>>>,
}

impl fmt::Debug for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHost")
            .field("label", &self.label())
            .field("id", &self.id)
            .field("route", &self.route)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

mod channel;
mod client;
mod copy;
mod exec;
mod group;
mod interactive;
mod proxy;
mod security;
mod transport;
