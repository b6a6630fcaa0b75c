use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hand-off record produced by the build stage and consumed by deploy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildArtifact {
    pub run_id: String,
    pub revision: String,
    pub bundle_path: PathBuf,
    pub bundle_sha256: String,
    pub bucket: String,
    pub key: String,
    pub descriptor_path: PathBuf,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn digest_file(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read bundle '{}'", path.display()))?;

    Ok(sha256_hex(&bytes))
}

/// The record travels next to the descriptor so a standalone deploy can
/// still verify the bundle it is about to ship.
pub fn record_path(descriptor_path: &Path) -> PathBuf {
    descriptor_path.with_extension("run.json")
}

pub fn write_record(artifact: &BuildArtifact, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(artifact)?;
    fs::write(path, json)
        .with_context(|| format!("failed to write run record '{}'", path.display()))?;

    Ok(())
}

pub fn read_record(path: &Path) -> Result<BuildArtifact> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read run record '{}'", path.display()))?;
    let artifact = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse run record '{}'", path.display()))?;

    Ok(artifact)
}

/// Deploy must ship the exact bytes the build stage produced.
pub fn verify_no_drift(artifact: &BuildArtifact) -> Result<()> {
    let current = digest_file(&artifact.bundle_path)?;
    if current != artifact.bundle_sha256 {
        bail!(
            "bundle '{}' changed since the build stage: digest {} does not match recorded {}",
            artifact.bundle_path.display(),
            current,
            artifact.bundle_sha256
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(label: &str, bytes: &[u8]) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("artifact-{label}-{}.zip", std::process::id()));
        fs::write(&path, bytes).unwrap();
        path
    }

    fn artifact_for(bundle_path: PathBuf, digest: String) -> BuildArtifact {
        BuildArtifact {
            run_id: "run-1".to_string(),
            revision: "abc123".to_string(),
            bundle_path,
            bundle_sha256: digest,
            bucket: "artifact-bucket".to_string(),
            key: "artifacts/run-1/function.zip".to_string(),
            descriptor_path: PathBuf::from("dist/packaged.yml"),
        }
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(sha256_hex(b"bootstrap"), sha256_hex(b"bootstrap"));
        assert_ne!(sha256_hex(b"bootstrap"), sha256_hex(b"bootstrap2"));
    }

    #[test]
    fn unchanged_bundle_passes_the_drift_check() {
        let path = scratch_file("clean", b"bundle bytes");
        let artifact = artifact_for(path.clone(), sha256_hex(b"bundle bytes"));

        verify_no_drift(&artifact).unwrap();

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn modified_bundle_fails_the_drift_check() {
        let path = scratch_file("drifted", b"bundle bytes");
        let artifact = artifact_for(path.clone(), sha256_hex(b"bundle bytes"));
        fs::write(&path, b"tampered bytes").unwrap();

        let error = verify_no_drift(&artifact).unwrap_err();
        assert!(error.to_string().contains("changed since the build stage"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn record_round_trips_through_disk() {
        let bundle = scratch_file("record", b"bundle bytes");
        let record = std::env::temp_dir().join(format!("record-{}.run.json", std::process::id()));
        let artifact = artifact_for(bundle.clone(), sha256_hex(b"bundle bytes"));

        write_record(&artifact, &record).unwrap();
        let read_back = read_record(&record).unwrap();
        assert_eq!(read_back, artifact);

        let _ = fs::remove_file(&bundle);
        let _ = fs::remove_file(&record);
    }

    #[test]
    fn record_sits_beside_the_descriptor() {
        assert_eq!(
            record_path(Path::new("dist/packaged.yml")),
            PathBuf::from("dist/packaged.run.json")
        );
    }
}
