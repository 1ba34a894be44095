//! Engine configuration: `database`/`logging`/`service`/`integrations`/
//! `documentation`. Only `database` is interpreted here, to pick a store
//! backend; the rest are carried opaquely since their owners (log sinks,
//! a poll loop, doc builds, bundled integrations) live outside this binary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub provider: String,
    #[serde(rename = "connectionString")]
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub logging: Value,
    #[serde(default)]
    pub service: Value,
    #[serde(default)]
    pub integrations: Value,
    #[serde(default)]
    pub documentation: Value,
}

impl Config {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
