//! Compiler artifact lookup.
//!
//! Contracts are referenced by name (`Meeting`) or by a path to an artifact file. Names
//! are resolved inside the artifacts directory using the Hardhat and Foundry layouts,
//! which both place `<Name>.json` under a `<Name>.sol/` directory.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Bytes;
use anyhow::Context;
use serde::Deserialize;

/// Creation bytecode, either as a bare hex string (Hardhat) or wrapped in an object (Foundry).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Hex(String),
    Object { object: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    contract_name: Option<String>,
    bytecode: BytecodeField,
}

/// A compiled contract ready for deployment.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
    pub bytecode: Bytes,
}

impl Artifact {
    /// Load an artifact from a JSON file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let file: ArtifactFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        let hex = match &file.bytecode {
            BytecodeField::Hex(hex) => hex,
            BytecodeField::Object { object } => object,
        };
        let bytecode: Bytes = hex
            .parse()
            .with_context(|| format!("Invalid bytecode in artifact {}", path.display()))?;

        if bytecode.is_empty() {
            anyhow::bail!(
                "Artifact {} has no creation bytecode (abstract contract or interface?)",
                path.display()
            );
        }

        let name = file.contract_name.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        Ok(Self {
            name,
            path: path.to_path_buf(),
            bytecode,
        })
    }

    /// Resolve `identifier` to an artifact.
    ///
    /// `identifier` is either a path to an artifact file or a contract name looked up
    /// inside `artifacts_dir`.
    pub fn resolve(artifacts_dir: &Path, identifier: &str) -> anyhow::Result<Self> {
        let direct = PathBuf::from(identifier);
        if direct.extension().is_some_and(|ext| ext == "json") && direct.is_file() {
            return Self::load_from_file(&direct);
        }

        let path = find_artifact(artifacts_dir, identifier)?.with_context(|| {
            format!(
                "No artifact named {} found under {}",
                identifier,
                artifacts_dir.display()
            )
        })?;

        tracing::debug!(contract = identifier, path = %path.display(), "Resolved artifact");
        Self::load_from_file(&path)
    }
}

/// Depth-first search for `<name>.sol/<name>.json`, falling back to a top-level `<name>.json`.
fn find_artifact(dir: &Path, name: &str) -> anyhow::Result<Option<PathBuf>> {
    let flat = dir.join(format!("{name}.json"));
    if flat.is_file() {
        return Ok(Some(flat));
    }

    let wanted_dir = format!("{name}.sol");
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read artifacts directory {}", dir.display()))?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = entry.context("Failed to read artifacts directory entry")?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        if entry.file_name().to_string_lossy() == wanted_dir {
            let candidate = path.join(format!("{name}.json"));
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }
        subdirs.push(path);
    }

    subdirs.sort();
    for subdir in subdirs {
        // Hardhat keeps debug info and build-info next to artifacts.
        if subdir.file_name().is_some_and(|n| n == "build-info") {
            continue;
        }
        if let Some(found) = find_artifact(&subdir, name)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}
