//! `runtime` crate — maps `(runtime, env)` to an executable path.
//!
//! Resolution never fails: an unknown runtime degrades to treating the
//! runtime name itself as a command on `PATH`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const DEFAULT_ENV: &str = "default";

/// `{ <runtime>: { default: <path>, <env>: <path> } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeRegistry(HashMap<String, HashMap<String, String>>);

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: HashMap<String, HashMap<String, String>>) -> Self {
        RuntimeRegistry(map)
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let map = serde_json::from_str(&text)?;
        Ok(RuntimeRegistry(map))
    }

    /// Resolve `(runtime, env)` to an executable path.
    ///
    /// Resolution order:
    /// 1. exact `(runtime, env)`
    /// 2. `(runtime, "default")`
    /// 3. the literal `runtime` string, interpreted as a command on `PATH`.
    pub fn resolve(&self, runtime: &str, env: &str) -> String {
        if let Some(envs) = self.0.get(runtime) {
            if let Some(path) = envs.get(env) {
                return path.clone();
            }
            if let Some(path) = envs.get(DEFAULT_ENV) {
                return path.clone();
            }
        }
        runtime.to_string()
    }
}
