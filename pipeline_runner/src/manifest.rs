use std::fs;
use std::path::Path;

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Function manifest, one per deployable crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub display_name: String,
    pub runtime: String,
    pub handler: String,
    pub path: String,
    pub architectures: Vec<String>,
}

pub fn discover(root: &Path) -> Result<Vec<Manifest>> {
    WalkDir::new(root)
        .max_depth(2)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == "manifest.yml")
        .map(|e| load(e.path()))
        .collect()
}

/// The pipeline ships exactly one endpoint.
pub fn single(root: &Path) -> Result<Manifest> {
    let mut manifests = discover(root)?;

    match manifests.len() {
        0 => bail!("no manifest.yml found under '{}'", root.display()),
        1 => Ok(manifests.remove(0)),
        n => bail!(
            "expected one function manifest under '{}', found {n}",
            root.display()
        ),
    }
}

fn load(path: &Path) -> Result<Manifest> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let manifest = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse '{}'", path.display()))?;

    Ok(manifest)
}
