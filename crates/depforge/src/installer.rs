//! Package installer (C6): spawns the detected package manager with
//! category-appropriate arguments.
//!
//! All packages go in a single invocation per category — batching avoids
//! sequential lock-file rewrites. The child process is spawned without any
//! shell interpretation and inherits this process's stdio so the user sees
//! real-time package-manager output. No timeout is imposed: large installs
//! must be allowed to complete.

use std::path::Path;

use depforge_process::{run_inherited, SpawnOutcome};
use depforge_types::{Category, InstallError, InstallResult, PackageManager, Specifier};

/// Characters that must never appear in a package name handed to the
/// installer, even though the child process is never spawned through a
/// shell. Defence in depth over the no-shell requirement.
const FORBIDDEN_CHARACTERS: &[char] =
    &[';', '|', '&', '$', '`', '>', '<', '\n', '\r', '\\', '(', ')', '*', '?', '~', '!', '#'];

/// Reject any package name containing a forbidden metacharacter.
pub fn check_safe_for_spawn(name: &str) -> Result<(), InstallError> {
    if name.chars().any(|c| FORBIDDEN_CHARACTERS.contains(&c)) {
        return Err(InstallError::InvalidArgument { name: name.to_string() });
    }
    Ok(())
}

/// The argv tail (after the manager binary) for installing `packages` of
/// `category` with `manager`. A closed mapping from `(manager, category)`
/// to a fixed shape.
pub(crate) fn build_argv(manager: PackageManager, category: Category, packages: &[String]) -> Vec<String> {
    let mut argv = match (manager, category) {
        (PackageManager::Npm, Category::Production) => vec!["install".to_string(), "--save".to_string()],
        (PackageManager::Npm, Category::Development) => {
            vec!["install".to_string(), "--save-dev".to_string()]
        }
        (PackageManager::Pnpm, Category::Production) => vec!["add".to_string()],
        (PackageManager::Pnpm, Category::Development) => vec!["add".to_string(), "--save-dev".to_string()],
        (PackageManager::Yarn, Category::Production) => vec!["add".to_string()],
        (PackageManager::Yarn, Category::Development) => vec!["add".to_string(), "--dev".to_string()],
    };
    argv.extend(packages.iter().cloned());
    argv
}

/// One install invocation: a manager, the packages to install, the project
/// root to run in, and their shared category.
pub struct InstallRequest<'a> {
    pub manager: PackageManager,
    pub packages: &'a [Specifier],
    pub project_root: &'a Path,
    pub category: Category,
}

/// Spawn the package manager to install `request.packages`, classifying
/// the outcome.
pub fn install(request: InstallRequest<'_>) -> Result<InstallResult, InstallError> {
    let names: Vec<String> = request.packages.iter().map(Specifier::package_name).collect();
    for name in &names {
        check_safe_for_spawn(name)?;
    }

    let argv = build_argv(request.manager, request.category, &names);
    let args: Vec<&str> = argv.iter().map(String::as_str).collect();
    let binary = request.manager.binary_name();

    match run_inherited(binary, &args, request.project_root) {
        SpawnOutcome::Exited(0) => Ok(InstallResult {
            packages: request.packages.to_vec(),
            category: request.category,
        }),
        SpawnOutcome::Exited(code) => Err(InstallError::InstallFailed { exit_code: Some(code) }),
        SpawnOutcome::SpawnFailed(reason) => Err(InstallError::ExecutionFailed { reason }),
    }
}

/// Abstracts the installer behind a trait so the orchestrator's loop can be
/// exercised against a scripted fake instead of a real package-manager
/// spawn.
pub trait Installer {
    fn install(&self, request: InstallRequest<'_>) -> Result<InstallResult, InstallError>;
}

/// The real installer: spawns the detected package manager.
#[derive(Debug, Default)]
pub struct SystemInstaller;

impl Installer for SystemInstaller {
    fn install(&self, request: InstallRequest<'_>) -> Result<InstallResult, InstallError> {
        install(request)
    }
}
