use anyhow::{bail, Context as _, Result};
use tracing::info;

use crate::artifact::BuildArtifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Source,
    Build,
    Approval,
    Deploy,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Build => "build",
            Self::Approval => "approval",
            Self::Deploy => "deploy",
        }
    }
}

/// State handed from stage to stage within a single run. Runs never share a
/// context.
#[derive(Debug)]
pub struct PipelineContext {
    pub run_id: String,
    pub revision: Option<String>,
    pub artifact: Option<BuildArtifact>,
}

impl PipelineContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            revision: None,
            artifact: None,
        }
    }
}

pub trait Stage {
    fn kind(&self) -> StageKind;
    fn execute(&mut self, ctx: &mut PipelineContext) -> Result<()>;
}

/// Strictly ordered, no branching, no retries. The first failure halts the
/// run; later stages never execute.
pub fn run_pipeline(stages: &mut [Box<dyn Stage>], ctx: &mut PipelineContext) -> Result<()> {
    for stage in stages.iter_mut() {
        let name = stage.kind().name();
        info!("stage {name} started");
        stage
            .execute(ctx)
            .with_context(|| format!("stage {name} failed"))?;
        info!("stage {name} succeeded");
    }

    Ok(())
}

pub trait ApprovalGate {
    fn request_approval(&mut self, summary: &str) -> Result<bool>;
}

/// Interactive gate: the operator answers on stdin. Blocks until answered.
pub struct StdinGate;

impl ApprovalGate for StdinGate {
    fn request_approval(&mut self, summary: &str) -> Result<bool> {
        eprintln!("{summary}");
        eprintln!("Type 'yes' to release the deployment:");

        let mut answer = String::new();
        std::io::stdin()
            .read_line(&mut answer)
            .context("failed to read approval answer")?;

        Ok(answer.trim().eq_ignore_ascii_case("yes"))
    }
}

/// Pre-acknowledged gate for `run --approve` and tests.
pub struct PresetGate(pub bool);

impl ApprovalGate for PresetGate {
    fn request_approval(&mut self, _summary: &str) -> Result<bool> {
        Ok(self.0)
    }
}

pub struct ApprovalStage {
    gate: Box<dyn ApprovalGate>,
}

impl ApprovalStage {
    pub fn new(gate: Box<dyn ApprovalGate>) -> Self {
        Self { gate }
    }
}

impl Stage for ApprovalStage {
    fn kind(&self) -> StageKind {
        StageKind::Approval
    }

    fn execute(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        let artifact = ctx
            .artifact
            .as_ref()
            .context("approval requires a build artifact")?;

        let summary = format!(
            "Pending deployment: run {} revision {} bundle sha256 {}",
            ctx.run_id,
            ctx.revision.as_deref().unwrap_or("unversioned"),
            artifact.bundle_sha256
        );

        if !self.gate.request_approval(&summary)? {
            bail!("deployment rejected at the approval gate");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    struct Scripted {
        kind: StageKind,
        fail: bool,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Stage for Scripted {
        fn kind(&self) -> StageKind {
            self.kind
        }

        fn execute(&mut self, _ctx: &mut PipelineContext) -> Result<()> {
            self.log.borrow_mut().push(self.kind.name());
            if self.fail {
                bail!("scripted failure");
            }
            Ok(())
        }
    }

    fn scripted(log: &Rc<RefCell<Vec<&'static str>>>, failing: Option<StageKind>) -> Vec<Box<dyn Stage>> {
        [
            StageKind::Source,
            StageKind::Build,
            StageKind::Approval,
            StageKind::Deploy,
        ]
        .into_iter()
        .map(|kind| {
            Box::new(Scripted {
                kind,
                fail: failing == Some(kind),
                log: Rc::clone(log),
            }) as Box<dyn Stage>
        })
        .collect()
    }

    fn test_artifact() -> BuildArtifact {
        BuildArtifact {
            run_id: "run-1".to_string(),
            revision: "abc123".to_string(),
            bundle_path: PathBuf::from("dist/function.zip"),
            bundle_sha256: "digest".to_string(),
            bucket: "artifact-bucket".to_string(),
            key: "artifacts/run-1/function.zip".to_string(),
            descriptor_path: PathBuf::from("dist/packaged.yml"),
        }
    }

    #[test]
    fn stages_run_in_fixed_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stages = scripted(&log, None);
        let mut ctx = PipelineContext::new("run-1");

        run_pipeline(&mut stages, &mut ctx).unwrap();

        assert_eq!(*log.borrow(), vec!["source", "build", "approval", "deploy"]);
    }

    #[test]
    fn failed_build_halts_before_approval_and_deploy() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stages = scripted(&log, Some(StageKind::Build));
        let mut ctx = PipelineContext::new("run-1");

        let error = run_pipeline(&mut stages, &mut ctx).unwrap_err();

        assert!(error.to_string().contains("stage build failed"));
        assert_eq!(*log.borrow(), vec!["source", "build"]);
    }

    #[test]
    fn rejected_approval_halts_before_deploy() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(Scripted {
                kind: StageKind::Build,
                fail: false,
                log: Rc::clone(&log),
            }),
            Box::new(ApprovalStage::new(Box::new(PresetGate(false)))),
            Box::new(Scripted {
                kind: StageKind::Deploy,
                fail: false,
                log: Rc::clone(&log),
            }),
        ];
        let mut ctx = PipelineContext::new("run-1");
        ctx.artifact = Some(test_artifact());

        let error = run_pipeline(&mut stages, &mut ctx).unwrap_err();

        assert!(error.to_string().contains("stage approval failed"));
        assert_eq!(*log.borrow(), vec!["build"]);
    }

    #[test]
    fn acknowledged_approval_lets_the_run_continue() {
        let mut stage = ApprovalStage::new(Box::new(PresetGate(true)));
        let mut ctx = PipelineContext::new("run-1");
        ctx.artifact = Some(test_artifact());

        stage.execute(&mut ctx).unwrap();
    }

    #[test]
    fn approval_without_an_artifact_is_an_error() {
        let mut stage = ApprovalStage::new(Box::new(PresetGate(true)));
        let mut ctx = PipelineContext::new("run-1");

        let error = stage.execute(&mut ctx).unwrap_err();
        assert!(error.to_string().contains("requires a build artifact"));
    }
}
