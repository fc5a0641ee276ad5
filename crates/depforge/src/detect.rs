//! Package-manager detection (C2).
//!
//! Pure with respect to the filesystem: reads only, never writes. Called
//! exactly once per pipeline run and cached by the orchestrator.

use std::path::Path;

use depforge_types::{DetectionOutcome, PackageManager};

use crate::manifest;

/// Probe `project_root` for its package manager.
///
/// 1. Lock-file presence: if exactly one of the known lock files is
///    present, that's the manager. If two or more are present, the result
///    is `Ambiguous` — silently picking one risks mixed-manager corruption.
/// 2. Otherwise, the manifest's `packageManager` corepack field.
/// 3. Otherwise, default to npm.
pub fn detect(project_root: &Path) -> DetectionOutcome {
    let present: Vec<PackageManager> = PackageManager::all()
        .into_iter()
        .filter(|pm| project_root.join(pm.lock_file_name()).is_file())
        .collect();

    match present.as_slice() {
        [] => {}
        [single] => return DetectionOutcome::Detected(*single),
        _ => return DetectionOutcome::Ambiguous(present),
    }

    if let Ok(Some(pm)) = manifest::read_package_manager_field(project_root) {
        return DetectionOutcome::Detected(pm);
    }

    DetectionOutcome::Detected(PackageManager::Npm)
}
