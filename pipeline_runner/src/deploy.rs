use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use aws_sdk_cloudformation::types::{Capability, ChangeSetStatus, ChangeSetType, StackStatus};
use tracing::info;

use crate::artifact;
use crate::stage::{PipelineContext, Stage, StageKind};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_POLLS: usize = 120;

pub fn change_set_name(stack_name: &str, run_id: &str) -> String {
    format!("{stack_name}-{run_id}")
}

pub struct DeployStage {
    client: aws_sdk_cloudformation::Client,
    stack_name: String,
}

impl DeployStage {
    pub fn new(client: aws_sdk_cloudformation::Client, stack_name: impl Into<String>) -> Self {
        Self {
            client,
            stack_name: stack_name.into(),
        }
    }
}

impl Stage for DeployStage {
    fn kind(&self) -> StageKind {
        StageKind::Deploy
    }

    fn execute(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        let built = pending_artifact(ctx)?;

        let template_body = fs::read_to_string(&built.descriptor_path).with_context(|| {
            format!(
                "failed to read descriptor '{}'",
                built.descriptor_path.display()
            )
        })?;

        let client = self.client.clone();
        let stack_name = self.stack_name.clone();
        let name = change_set_name(&stack_name, &ctx.run_id);

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                apply_template(&client, &stack_name, &name, template_body).await
            })
        })
    }
}

/// Deploy only ships what the build stage handed over, unchanged.
fn pending_artifact(ctx: &PipelineContext) -> Result<&artifact::BuildArtifact> {
    let built = ctx
        .artifact
        .as_ref()
        .context("deploy requires a build artifact")?;
    artifact::verify_no_drift(built)?;

    Ok(built)
}

/// Standalone `deploy` entry: verifies against the run record when one sits
/// beside the descriptor.
pub async fn deploy_descriptor(
    client: &aws_sdk_cloudformation::Client,
    stack_name: &str,
    descriptor_path: &Path,
    run_id: &str,
) -> Result<()> {
    let record = artifact::record_path(descriptor_path);
    if record.is_file() {
        let built = artifact::read_record(&record)?;
        artifact::verify_no_drift(&built)?;
    }

    let template_body = fs::read_to_string(descriptor_path)
        .with_context(|| format!("failed to read descriptor '{}'", descriptor_path.display()))?;

    apply_template(
        client,
        stack_name,
        &change_set_name(stack_name, run_id),
        template_body,
    )
    .await
}

/// The embedded serverless transform needs the elevated capability flags.
pub async fn apply_template(
    client: &aws_sdk_cloudformation::Client,
    stack_name: &str,
    change_set_name: &str,
    template_body: String,
) -> Result<()> {
    let change_set_type = if stack_exists(client, stack_name).await {
        ChangeSetType::Update
    } else {
        ChangeSetType::Create
    };

    client
        .create_change_set()
        .stack_name(stack_name)
        .change_set_name(change_set_name)
        .change_set_type(change_set_type)
        .template_body(template_body)
        .capabilities(Capability::CapabilityIam)
        .capabilities(Capability::CapabilityAutoExpand)
        .send()
        .await
        .context("failed to create change set")?;

    wait_for_change_set(client, stack_name, change_set_name).await?;

    client
        .execute_change_set()
        .stack_name(stack_name)
        .change_set_name(change_set_name)
        .send()
        .await
        .context("failed to execute change set")?;

    wait_for_stack(client, stack_name).await
}

async fn stack_exists(client: &aws_sdk_cloudformation::Client, stack_name: &str) -> bool {
    client
        .describe_stacks()
        .stack_name(stack_name)
        .send()
        .await
        .is_ok()
}

async fn wait_for_change_set(
    client: &aws_sdk_cloudformation::Client,
    stack_name: &str,
    change_set_name: &str,
) -> Result<()> {
    for _ in 0..MAX_POLLS {
        let described = client
            .describe_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set_name)
            .send()
            .await
            .context("failed to describe change set")?;

        match described.status() {
            Some(ChangeSetStatus::CreateComplete) => return Ok(()),
            Some(ChangeSetStatus::Failed) => bail!(
                "change set failed: {}",
                described.status_reason().unwrap_or("no reason reported")
            ),
            _ => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }

    bail!("timed out waiting for change set '{change_set_name}'")
}

async fn wait_for_stack(client: &aws_sdk_cloudformation::Client, stack_name: &str) -> Result<()> {
    for _ in 0..MAX_POLLS {
        let described = client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
            .context("failed to describe stack")?;

        let status = described
            .stacks()
            .and_then(|stacks| stacks.first())
            .and_then(|stack| stack.stack_status());

        match status {
            Some(StackStatus::CreateComplete) | Some(StackStatus::UpdateComplete) => {
                info!("stack {stack_name} settled");
                return Ok(());
            }
            Some(StackStatus::CreateInProgress)
            | Some(StackStatus::UpdateInProgress)
            | Some(StackStatus::UpdateCompleteCleanupInProgress)
            | Some(StackStatus::ReviewInProgress)
            | None => tokio::time::sleep(POLL_INTERVAL).await,
            Some(other) => bail!("stack {stack_name} entered status {}", other.as_str()),
        }
    }

    bail!("timed out waiting for stack '{stack_name}'")
}
