//! Client config loader (strict parsing).

pub mod schema;

use std::fs;

use ccslink_core::error::{CcsError, Result};

pub use schema::{
    AuthSection, ClientConfig, ExtensionSection, RegistrySection, ServerSection, SessionSection,
};

pub fn load_from_file(path: &str) -> Result<ClientConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| CcsError::Config(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ClientConfig> {
    let cfg: ClientConfig =
        serde_yaml::from_str(s).map_err(|e| CcsError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
