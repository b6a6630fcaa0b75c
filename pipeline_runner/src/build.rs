use std::env;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context as _, Result};
use serde::Serialize;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::artifact::{self, BuildArtifact};
use crate::manifest::Manifest;
use crate::parameters::Parameters;
use crate::stage::{PipelineContext, Stage, StageKind};
use crate::template::{self, CodeLocation};

pub const BUCKET_MISSING_DIAGNOSTIC: &str = "artifact bucket does not exist or is not accessible";

/// The S3 surface the build stage needs. The AWS client stays at the binary
/// rim so the halting paths run without AWS.
pub trait ArtifactStore {
    fn bucket_exists(&self, bucket: &str) -> bool;
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), String>;
}

pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
}

impl S3ArtifactStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

impl ArtifactStore for S3ArtifactStore {
    fn bucket_exists(&self, bucket: &str) -> bool {
        let client = self.client.clone();
        let bucket = bucket.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current()
                .block_on(async move { shared::s3::bucket_exists(&client, &bucket).await })
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), String> {
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();
        let content_type = content_type.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                shared::s3::put_bytes(&client, &bucket, &key, &content_type, body)
                    .await
                    .map_err(|error| format!("failed to upload '{key}': {error}"))
            })
        })
    }
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub repo_root: PathBuf,
    pub target: String,
    pub dist_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct RunMetadata<'a> {
    run_id: &'a str,
    revision: &'a str,
    bundle_sha256: &'a str,
    key: &'a str,
}

pub fn artifact_bucket() -> Result<String> {
    env::var("S3_BUCKET").map_err(|_| anyhow::anyhow!("S3_BUCKET must be configured"))
}

/// The one validation this pipeline defines: halt the whole run when the
/// artifact bucket is absent.
pub fn ensure_bucket(store: &dyn ArtifactStore, bucket: &str) -> Result<()> {
    if !store.bucket_exists(bucket) {
        bail!("{BUCKET_MISSING_DIAGNOSTIC}: '{bucket}'");
    }

    Ok(())
}

pub fn bundle_key(prefix: &str, run_id: &str) -> String {
    format!("{prefix}/{run_id}/function.zip")
}

fn compile_handler(options: &BuildOptions) -> Result<PathBuf> {
    let args = [
        "build",
        "-p",
        "hello_lambda",
        "--release",
        "--target",
        options.target.as_str(),
    ];
    info!("cargo {}", args.join(" "));

    let status = Command::new("cargo")
        .args(args)
        .current_dir(&options.repo_root)
        .status()
        .context("failed to execute cargo")?;
    if !status.success() {
        bail!("cargo build failed with status {status}");
    }

    Ok(options
        .repo_root
        .join("target")
        .join(&options.target)
        .join("release")
        .join("hello_lambda"))
}

/// Lambda custom runtimes load the zip entry named `bootstrap`.
pub fn package_bundle(binary_path: &Path, bundle_path: &Path) -> Result<()> {
    if !binary_path.is_file() {
        bail!("expected lambda binary at '{}'", binary_path.display());
    }

    let binary = fs::read(binary_path)
        .with_context(|| format!("failed to read lambda binary '{}'", binary_path.display()))?;

    if let Some(parent) = bundle_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create '{}'", parent.display()))?;
    }
    let file = fs::File::create(bundle_path)
        .with_context(|| format!("failed to create '{}'", bundle_path.display()))?;

    let mut zip = ZipWriter::new(file);
    let entry_options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", entry_options)?;
    zip.write_all(&binary)?;
    zip.finish()?;

    Ok(())
}

pub struct BuildStage {
    parameters: Parameters,
    manifest: Manifest,
    options: BuildOptions,
    store: Box<dyn ArtifactStore>,
}

impl BuildStage {
    pub fn new(
        parameters: Parameters,
        manifest: Manifest,
        options: BuildOptions,
        store: Box<dyn ArtifactStore>,
    ) -> Self {
        Self {
            parameters,
            manifest,
            options,
            store,
        }
    }
}

impl Stage for BuildStage {
    fn kind(&self) -> StageKind {
        StageKind::Build
    }

    fn execute(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        let bucket = artifact_bucket()?;
        ensure_bucket(self.store.as_ref(), &bucket)?;

        let binary = compile_handler(&self.options)?;
        let bundle_path = self.options.dist_dir.join("function.zip");
        package_bundle(&binary, &bundle_path)?;
        let bundle_sha256 = artifact::digest_file(&bundle_path)?;

        let key = bundle_key(&self.parameters.artifact_prefix, &ctx.run_id);
        let bytes = fs::read(&bundle_path)
            .with_context(|| format!("failed to read bundle '{}'", bundle_path.display()))?;
        self.store
            .put_object(&bucket, &key, "application/zip", bytes)
            .map_err(anyhow::Error::msg)?;
        info!("uploaded bundle to s3://{bucket}/{key}");

        let revision = ctx
            .revision
            .clone()
            .unwrap_or_else(|| "unversioned".to_string());
        let metadata = RunMetadata {
            run_id: &ctx.run_id,
            revision: &revision,
            bundle_sha256: &bundle_sha256,
            key: &key,
        };
        let metadata_key = format!(
            "{}/{}/metadata.json",
            self.parameters.artifact_prefix, ctx.run_id
        );
        self.store
            .put_object(
                &bucket,
                &metadata_key,
                "application/json",
                serde_json::to_vec_pretty(&metadata)?,
            )
            .map_err(anyhow::Error::msg)?;

        let descriptor_path = self.options.dist_dir.join("packaged.yml");
        let code = CodeLocation::Remote {
            bucket: bucket.clone(),
            key: key.clone(),
        };
        let packaged = template::build_template(&self.parameters, &self.manifest, &code);
        template::create_template_file(&descriptor_path, &packaged)?;
        info!("wrote descriptor '{}'", descriptor_path.display());

        let built = BuildArtifact {
            run_id: ctx.run_id.clone(),
            revision,
            bundle_path,
            bundle_sha256,
            bucket,
            key,
            descriptor_path: descriptor_path.clone(),
        };
        artifact::write_record(&built, &artifact::record_path(&descriptor_path))?;
        ctx.artifact = Some(built);

        Ok(())
    }
}
