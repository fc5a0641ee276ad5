//! Feedback formatters (C10): render the three shapes of retry message the
//! orchestrator sends back into the coder agent.
//!
//! Each formatter produces a single multi-line string. No structured object
//! crosses the boundary back into the coder — the string is the entire
//! contract.

use std::collections::BTreeMap;

use depforge_types::{InstallError, PackageManager, Specifier, Substitute};

/// One line per rejected package, plus one line per registry-invalid
/// package carrying its curated fix when known.
pub fn rejection_feedback(rejected: &[Specifier], registry_invalid: &[(Specifier, String)]) -> String {
    let mut lines = Vec::new();

    for package in rejected {
        lines.push(format!(
            "Package \"{}\" was rejected by user. Rewrite without using this package.",
            package.package_name()
        ));
    }

    for (package, suggested_fix) in registry_invalid {
        lines.push(format!(
            "Package \"{}\" does not exist on the registry. {}",
            package.package_name(),
            suggested_fix
        ));
    }

    lines.join("\n")
}

/// One line per substitution the user chose, each optionally followed by an
/// `Example:` line pulled from the curated `Substitute` entry.
pub fn alternative_feedback(alternatives: &BTreeMap<Specifier, Substitute>) -> String {
    let mut lines = Vec::new();

    for (package, substitute) in alternatives {
        lines.push(format!(
            "User chose built-in alternative for \"{}\". Replace all imports of \"{}\" with \"{}\".",
            package.package_name(),
            package.package_name(),
            substitute.module
        ));
        lines.push(format!("Example: {}", substitute.example));
    }

    lines.join("\n")
}

/// A structured block describing a failed install attempt, always following
/// a backup restore: error kind, the attempted package list, the package
/// manager, exit code if present, the rollback sentence, kind-appropriate
/// causes, and a closing directive.
pub fn install_failure_feedback(error: &InstallError, attempted: &[Specifier], manager: PackageManager) -> String {
    let package_list = attempted
        .iter()
        .map(Specifier::package_name)
        .collect::<Vec<_>>()
        .join(", ");

    let mut lines = vec![
        format!("Install failed for packages: {package_list}"),
        format!("Package manager: {}", manager.binary_name()),
    ];

    match error {
        InstallError::InstallFailed { exit_code } => {
            lines.push("Error kind: install_failed".to_string());
            if let Some(code) = exit_code {
                lines.push(format!("Exit code: {code}"));
            }
            lines.push("Project state has been rolled back to before installation attempt.".to_string());
            lines.push("Possible causes: a package name is misspelled, a version constraint cannot be resolved, or a network/registry outage occurred.".to_string());
        }
        InstallError::ExecutionFailed { reason } => {
            lines.push("Error kind: execution_failed".to_string());
            lines.push(format!("Reason: {reason}"));
            lines.push("Project state has been rolled back to before installation attempt.".to_string());
            lines.push(format!(
                "Possible causes: the \"{}\" binary is not installed or not on PATH.",
                manager.binary_name()
            ));
        }
        InstallError::InvalidArgument { name } => {
            lines.push("Error kind: invalid_argument".to_string());
            lines.push(format!("Offending package name: {name}"));
            lines.push("Project state has been rolled back to before installation attempt.".to_string());
            lines.push("Possible causes: the package name contains characters that are never valid in an npm package name.".to_string());
        }
    }

    lines.push("Rewrite the affected imports so the install is not required, or use a different package.".to_string());

    lines.join("\n")
}

/// "Rewrite without these packages" feedback used when detection is
/// ambiguous or the coder must retry without attempting any install at all.
pub fn rewrite_without_feedback(missing: &[Specifier], fixes: &[String]) -> String {
    let mut lines = Vec::new();
    for (package, fix) in missing.iter().zip(fixes.iter()) {
        lines.push(format!(
            "Package \"{}\" cannot be installed right now. {}",
            package.package_name(),
            fix
        ));
    }
    lines.join("\n")
}
