use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    pub stack_name: String,
    pub function_name: String,
    pub artifact_prefix: String,
    pub log_retention_in_days: u16,
    pub function_memory: u16,
    pub function_timeout: u16,
}

pub fn load(path: &Path) -> Result<Parameters> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let parameters = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse '{}'", path.display()))?;

    Ok(parameters)
}
