use std::env;
use std::time::Duration;

use serde::Deserialize;

use ccslink_core::error::{CcsError, Result};
use ccslink_core::protocol::{GCM_ELEMENT, GCM_NAMESPACE};

/// Domain appended to the sender id to form the XMPP username.
pub const GCM_USER_DOMAIN: &str = "gcm.googleapis.com";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    pub auth: AuthSection,

    #[serde(default)]
    pub extension: ExtensionSection,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub registry: RegistrySection,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(CcsError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }
        self.server.validate()?;
        self.auth.validate()?;
        self.extension.validate()?;
        self.session.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(CcsError::Config("server.host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(CcsError::Config("server.port must not be 0".into()));
        }
        if !(1000..=120000).contains(&self.connect_timeout_ms) {
            return Err(CcsError::Config(
                "server.connect_timeout_ms must be between 1000 and 120000".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_host() -> String {
    "gcm.googleapis.com".into()
}
fn default_port() -> u16 {
    5235
}
fn default_connect_timeout_ms() -> u64 {
    10000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// Project sender id.
    pub sender_id: String,

    /// Server API key, inline.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl AuthSection {
    pub fn validate(&self) -> Result<()> {
        if self.sender_id.trim().is_empty() {
            return Err(CcsError::Config("auth.sender_id must not be empty".into()));
        }
        match (&self.api_key, &self.api_key_env) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(CcsError::Config(
                "exactly one of auth.api_key or auth.api_key_env must be set".into(),
            )),
        }
    }

    /// `SENDER_ID@gcm.googleapis.com`.
    pub fn username(&self) -> String {
        format!("{}@{}", self.sender_id, GCM_USER_DOMAIN)
    }

    /// Resolve the API key from the config or the environment.
    pub fn credential(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        let var = self
            .api_key_env
            .as_deref()
            .ok_or_else(|| CcsError::Config("no api key configured".into()))?;
        env::var(var).map_err(|e| CcsError::Config(format!("api key env {var}: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_element")]
    pub element: String,
}

impl Default for ExtensionSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            element: default_element(),
        }
    }
}

impl ExtensionSection {
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() || self.element.is_empty() {
            return Err(CcsError::Config(
                "extension.namespace and extension.element must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_namespace() -> String {
    GCM_NAMESPACE.into()
}
fn default_element() -> String {
    GCM_ELEMENT.into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    /// Let the transport reconnect after the session has authenticated.
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,

    /// Capacity of the outbound stanza queue.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            reconnect: default_reconnect(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl SessionSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=65536).contains(&self.outbound_queue) {
            return Err(CcsError::Config(
                "session.outbound_queue must be between 1 and 65536".into(),
            ));
        }
        Ok(())
    }
}

fn default_reconnect() -> bool {
    true
}
fn default_outbound_queue() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySection {
    #[serde(default = "default_registry_path")]
    pub path: String,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

fn default_registry_path() -> String {
    "regids.txt".into()
}
