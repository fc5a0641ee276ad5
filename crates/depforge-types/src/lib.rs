//! Shared data model for the install-and-repair pipeline.
//!
//! This crate holds plain data types with no I/O: the package manager
//! tag, the canonicalised import `Specifier`, validation reports, backup
//! state, consent decisions, and the pipeline's kinded error type. Logic
//! that acts on these types (detection, registry calls, installation,
//! consent prompting) lives in the `depforge` crate.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A package manager supported by the installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
}

impl PackageManager {
    /// The lock-file name this manager writes, used for detection.
    pub fn lock_file_name(self) -> &'static str {
        match self {
            PackageManager::Npm => "package-lock.json",
            PackageManager::Pnpm => "pnpm-lock.yaml",
            PackageManager::Yarn => "yarn.lock",
        }
    }

    /// The binary invoked to drive this manager.
    pub fn binary_name(self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
        }
    }

    /// Parse the `name` component of a `packageManager` manifest field
    /// (`name@version`), ignoring the version suffix.
    pub fn from_corepack_field(value: &str) -> Option<Self> {
        let name = value.split('@').next().unwrap_or(value);
        match name {
            "npm" => Some(PackageManager::Npm),
            "pnpm" => Some(PackageManager::Pnpm),
            "yarn" => Some(PackageManager::Yarn),
            _ => None,
        }
    }

    pub fn all() -> [PackageManager; 3] {
        [PackageManager::Npm, PackageManager::Pnpm, PackageManager::Yarn]
    }
}

/// Outcome of probing a project for its package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionOutcome {
    Detected(PackageManager),
    /// More than one lock file was present; installation must not proceed.
    Ambiguous(Vec<PackageManager>),
}

impl DetectionOutcome {
    pub fn manager(&self) -> Option<PackageManager> {
        match self {
            DetectionOutcome::Detected(pm) => Some(*pm),
            DetectionOutcome::Ambiguous(_) => None,
        }
    }
}

/// A normalised module identifier extracted from an import/require statement.
///
/// Subpaths (`pkg/sub`) and builtin prefixes (`node:x`) are discarded during
/// extraction, so a `Specifier` is always just the installable package name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Specifier {
    Scoped { scope: String, name: String },
    Bare(String),
}

impl Specifier {
    /// The string form used for registry lookups and installer argv, e.g.
    /// `@scope/name` or `name`.
    pub fn package_name(&self) -> String {
        match self {
            Specifier::Scoped { scope, name } => format!("@{scope}/{name}"),
            Specifier::Bare(name) => name.clone(),
        }
    }

    /// Parse an already-canonical package name (e.g. a manifest dependency
    /// key) into a `Specifier`. Unlike import-statement extraction, this
    /// performs no builtin/relative filtering: the caller is asserting the
    /// name is a real declared dependency.
    pub fn parse(name: &str) -> Specifier {
        if let Some(rest) = name.strip_prefix('@') {
            if let Some((scope, pkg)) = rest.split_once('/') {
                return Specifier::Scoped {
                    scope: scope.to_string(),
                    name: pkg.to_string(),
                };
            }
        }
        Specifier::Bare(name.to_string())
    }
}

impl std::fmt::Display for Specifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.package_name())
    }
}

/// A curated built-in replacement for a well-known third-party package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitute {
    /// One-line human description of the replacement.
    pub description: String,
    /// The built-in module identifier to import instead (e.g. `node:crypto`).
    pub module: String,
    /// A minimal usage example.
    pub example: String,
    /// Minimum runtime version at which the substitute is stable.
    pub min_runtime_version: String,
}

/// The result of validating one generated source file's imports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub missing: Vec<Specifier>,
    pub fixes: Vec<String>,
    pub substitutes: BTreeMap<Specifier, Substitute>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Maps each missing specifier to the ordered list of files it was seen in.
pub type PackageFileMap = BTreeMap<Specifier, Vec<PathBuf>>;

/// Whether a package belongs in the manifest's production or development
/// dependency list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Production,
    Development,
}

/// The approved set partitioned by category, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorizedPackages {
    pub production: Vec<Specifier>,
    pub dev: Vec<Specifier>,
}

/// One side (manifest or lock file) of a backup snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub backup_path: PathBuf,
}

/// A snapshot of the manifest (and lock file, if present) taken immediately
/// before an install. Alive for the duration of exactly one install call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupState {
    pub manifest: BackupEntry,
    pub lock_file: Option<BackupEntry>,
}

/// Why a package install invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    /// The package manager ran and exited non-zero.
    InstallFailed { exit_code: Option<i32> },
    /// The package manager could not even be spawned.
    ExecutionFailed { reason: String },
    /// A package name failed the pre-spawn safety check.
    InvalidArgument { name: String },
}

/// Successful installer invocation: the packages that were requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    pub packages: Vec<Specifier>,
    pub category: Category,
}

/// The scope at which a user's approval of a package applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentScope {
    Once,
    Session,
    Project,
}

/// One recorded consent decision, as persisted in the project consent store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentDecision {
    pub package: String,
    pub scope: ConsentScope,
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub use_alternative: Option<String>,
}

/// The three-way partition produced by a batch consent request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchApprovalResult {
    pub approved: Vec<Specifier>,
    pub alternatives: BTreeMap<Specifier, String>,
    pub rejected: Vec<Specifier>,
}

/// One immutable line of the append-only audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditEventKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub package: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    DetectedPm,
    AmbiguousPm,
    RegistryVerdict,
    ConsentDecision,
    BackupCreated,
    InstallOutcome,
    BackupRestored,
    BackupCleaned,
    ValidationResult,
}

/// The pipeline's top-level kinded error. Every fallible public operation in
/// `depforge` returns `Result<_, PipelineError>`; nothing panics or throws
/// across a module boundary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("package manager detection is ambiguous: {0:?}")]
    AmbiguousDetection(Vec<PackageManager>),

    #[error("registry error for package {package}: {reason}")]
    Registry { package: String, reason: String },

    #[error("install failed: {0:?}")]
    Install(InstallError),

    #[error("backup operation failed: {0}")]
    Backup(String),

    #[error("consent store error: {0}")]
    Consent(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("coder agent error: {0}")]
    Coder(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
