//! Replay scenarios: a scripted chain plus the events to feed through it
//!
//! Files are JSON or YAML, picked by extension (`.json`, `.yaml`/`.yml`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{OracleError, Result};
use crate::oracle::sources::{ChainScript, ScriptedChain};
use crate::types::EventEnvelope;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub chain: ChainScript,
    pub events: Vec<EventEnvelope>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(serde_json::from_str(&raw)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&raw)?),
            _ => Err(OracleError::Scenario(format!(
                "unsupported scenario format: {}",
                path.display()
            ))),
        }
    }

    /// Chain the events will be resolved against
    pub fn chain(&self) -> ScriptedChain {
        ScriptedChain::from_script(self.chain.clone())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}
