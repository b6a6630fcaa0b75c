mod artifact;
mod build;
mod deploy;
mod manifest;
mod parameters;
mod source;
mod stage;
mod template;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::build::{BuildOptions, BuildStage, S3ArtifactStore};
use crate::deploy::DeployStage;
use crate::source::SourceStage;
use crate::stage::{
    run_pipeline, ApprovalGate, ApprovalStage, PipelineContext, PresetGate, Stage, StdinGate,
};
use crate::template::CodeLocation;

#[derive(Parser)]
#[command(
    name = "pipeline_runner",
    about = "Builds, approves, and deploys the hello endpoint"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the unpackaged CloudFormation template
    Template {
        /// Output file path
        #[arg(long, default_value = "template.yml")]
        output: PathBuf,
    },
    /// Package the handler and upload it to the artifact bucket
    Build {
        /// Compilation target triple for the Lambda binary
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
    },
    /// Apply a packaged template descriptor to the target stack
    Deploy {
        /// Descriptor produced by the build stage
        #[arg(long, default_value = "dist/packaged.yml")]
        descriptor: PathBuf,
    },
    /// Run the full pipeline: source, build, approval, deploy
    Run {
        /// Compilation target triple for the Lambda binary
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Acknowledge the approval gate up front (non-interactive runs)
        #[arg(long)]
        approve: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    shared::log::init();

    let cli = Cli::parse();
    let repo_root = PathBuf::from(".");

    match cli.command {
        Commands::Template { output } => {
            let parameters = parameters::load(&repo_root.join("parameters.yml"))?;
            let function = manifest::single(&repo_root)?;
            let code = CodeLocation::Local("dist/function.zip".to_string());
            let template = template::build_template(&parameters, &function, &code);
            template::create_template_file(&output, &template)?;
        }
        Commands::Build { target } => {
            let parameters = parameters::load(&repo_root.join("parameters.yml"))?;
            let function = manifest::single(&repo_root)?;
            let store = S3ArtifactStore::new(shared::s3::client().await);

            let mut ctx = PipelineContext::new(new_run_id());
            ctx.revision = Some(source::current_revision(&repo_root));

            let mut build = BuildStage::new(
                parameters,
                function,
                build_options(&repo_root, target),
                Box::new(store),
            );
            build.execute(&mut ctx)?;
        }
        Commands::Deploy { descriptor } => {
            let parameters = parameters::load(&repo_root.join("parameters.yml"))?;
            let client = cloudformation_client().await;
            deploy::deploy_descriptor(&client, &parameters.stack_name, &descriptor, &new_run_id())
                .await?;
        }
        Commands::Run { target, approve } => {
            let parameters = parameters::load(&repo_root.join("parameters.yml"))?;
            let function = manifest::single(&repo_root)?;
            let store = S3ArtifactStore::new(shared::s3::client().await);
            let client = cloudformation_client().await;

            let gate: Box<dyn ApprovalGate> = if approve {
                Box::new(PresetGate(true))
            } else {
                Box::new(StdinGate)
            };

            let mut stages: Vec<Box<dyn Stage>> = vec![
                Box::new(SourceStage::new(
                    repo_root.clone(),
                    vec![
                        PathBuf::from("parameters.yml"),
                        PathBuf::from("hello_lambda/manifest.yml"),
                    ],
                )),
                Box::new(BuildStage::new(
                    parameters.clone(),
                    function,
                    build_options(&repo_root, target),
                    Box::new(store),
                )),
                Box::new(ApprovalStage::new(gate)),
                Box::new(DeployStage::new(client, parameters.stack_name)),
            ];

            let mut ctx = PipelineContext::new(new_run_id());
            run_pipeline(&mut stages, &mut ctx)?;
        }
    }

    Ok(())
}

fn new_run_id() -> String {
    chrono::Utc::now().format("run-%Y%m%d-%H%M%S").to_string()
}

fn build_options(repo_root: &Path, target: String) -> BuildOptions {
    BuildOptions {
        repo_root: repo_root.to_path_buf(),
        target,
        dist_dir: repo_root.join("dist"),
    }
}

async fn cloudformation_client() -> aws_sdk_cloudformation::Client {
    let aws_config = aws_config::load_from_env().await;
    aws_sdk_cloudformation::Client::new(&aws_config)
}
