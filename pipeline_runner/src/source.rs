use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Result};
use tracing::warn;

use crate::stage::{PipelineContext, Stage, StageKind};

/// Pins the revision being shipped and checks the pipeline inputs exist.
pub struct SourceStage {
    repo_root: PathBuf,
    required_inputs: Vec<PathBuf>,
}

impl SourceStage {
    pub fn new(repo_root: impl Into<PathBuf>, required_inputs: Vec<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            required_inputs,
        }
    }
}

impl Stage for SourceStage {
    fn kind(&self) -> StageKind {
        StageKind::Source
    }

    fn execute(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        for input in &self.required_inputs {
            let path = self.repo_root.join(input);
            if !path.is_file() {
                bail!("pipeline input '{}' is missing", path.display());
            }
        }

        ctx.revision = Some(current_revision(&self.repo_root));

        Ok(())
    }
}

/// Best effort: a checkout without git still builds, it just ships
/// unversioned.
pub fn current_revision(root: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(root)
        .output();

    match output {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        Ok(output) => {
            warn!(
                "git rev-parse failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            "unversioned".to_string()
        }
        Err(error) => {
            warn!("git not available: {error}");
            "unversioned".to_string()
        }
    }
}
