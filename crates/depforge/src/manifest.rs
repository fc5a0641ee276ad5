//! Reads (never writes) the project manifest (`package.json`).
//!
//! Manifest edits are always delegated to the package manager (§ non-goals);
//! this module only extracts what the rest of the pipeline needs to read:
//! the declared dependency sets and the `packageManager` corepack hint.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use depforge_types::{PackageManager, PipelineError, Result};

pub const MANIFEST_FILE: &str = "package.json";

/// The production and development dependency names declared in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredDependencies {
    pub production: BTreeSet<String>,
    pub development: BTreeSet<String>,
}

/// Read the manifest's declared dependencies. A missing manifest is treated
/// as declaring nothing rather than an error, since a brand-new project may
/// not have one yet.
pub fn read_declared_dependencies(project_root: &Path) -> Result<DeclaredDependencies> {
    let path = project_root.join(MANIFEST_FILE);
    let Some(value) = read_manifest_json(&path)? else {
        return Ok(DeclaredDependencies::default());
    };

    let production = dependency_names(&value, "dependencies");
    let development = dependency_names(&value, "devDependencies");

    Ok(DeclaredDependencies {
        production,
        development,
    })
}

/// Read and parse the `packageManager` field (`name@version`), if present.
pub fn read_package_manager_field(project_root: &Path) -> Result<Option<PackageManager>> {
    let path = project_root.join(MANIFEST_FILE);
    let Some(value) = read_manifest_json(&path)? else {
        return Ok(None);
    };

    let field = value.get("packageManager").and_then(|v| v.as_str());
    Ok(field.and_then(PackageManager::from_corepack_field))
}

fn read_manifest_json(path: &Path) -> Result<Option<serde_json::Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        PipelineError::Config(format!(
            "failed to parse manifest JSON at {}: {e}",
            path.display()
        ))
    })?;
    Ok(Some(value))
}

fn dependency_names(manifest: &serde_json::Value, key: &str) -> BTreeSet<String> {
    manifest
        .get(key)
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_manifest(dir: &Path, json: &str) {
        fs::write(dir.join(MANIFEST_FILE), json).expect("write manifest");
    }

    #[test]
    fn missing_manifest_declares_nothing() {
        let dir = tempdir().expect("tempdir");
        let deps = read_declared_dependencies(dir.path()).expect("read");
        assert!(deps.production.is_empty());
        assert!(deps.development.is_empty());
    }

    #[test]
    fn reads_production_and_dev_dependency_names() {
        let dir = tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{
                "dependencies": {"fastify": "^4.0.0"},
                "devDependencies": {"chai": "^5.0.0"}
            }"#,
        );

        let deps = read_declared_dependencies(dir.path()).expect("read");
        assert!(deps.production.contains("fastify"));
        assert!(deps.development.contains("chai"));
    }

    #[test]
    fn reads_package_manager_field_ignoring_version() {
        let dir = tempdir().expect("tempdir");
        write_manifest(dir.path(), r#"{"packageManager": "pnpm@8.6.0"}"#);

        assert_eq!(
            read_package_manager_field(dir.path()).expect("read"),
            Some(PackageManager::Pnpm)
        );
    }

    #[test]
    fn unknown_package_manager_name_is_ignored() {
        let dir = tempdir().expect("tempdir");
        write_manifest(dir.path(), r#"{"packageManager": "bun@1.0.0"}"#);

        assert_eq!(read_package_manager_field(dir.path()).expect("read"), None);
    }
}
