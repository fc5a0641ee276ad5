//! Consent manager (C8): project-scope, session-scope, and interactive
//! per-package approval.
//!
//! Project-scope decisions persist to a hidden JSON file in the project
//! root with a versioned schema; a corrupt store falls back to empty
//! rather than failing the run — the consent store is advisory, unlike the
//! pipeline's own config file (§ config). Session scope lives only in
//! memory for the life of the process.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use depforge_types::{
    AuditEvent, AuditEventKind, BatchApprovalResult, ConsentDecision, ConsentScope, PackageFileMap,
    Specifier, Substitute,
};

pub const CONSENT_STORE_FILE: &str = ".depforge-consent.json";

const MAX_PERSISTED_DECISIONS: usize = 100;

/// What the interactive prompter's caller supplies for one package.
pub struct PromptContext<'a> {
    pub package: &'a Specifier,
    pub files: &'a [PathBuf],
    pub alternative: Option<&'a Substitute>,
    pub install_command: &'a str,
}

/// The user's response to one interactive consent prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResponse {
    ApproveOnce,
    ApproveSession,
    ApproveProject,
    Reject,
    UseAlternative,
}

/// The interactive per-package prompt. The CLI's implementation reads from
/// a terminal; tests inject a scripted fake.
pub trait ConsentPrompter {
    fn prompt(&mut self, context: &PromptContext<'_>) -> PromptResponse;
}

/// A prompter that always rejects, used when there's no way to ask (e.g. a
/// plan-only dry run that still wants a `ConsentManager` to call).
#[derive(Debug, Default)]
pub struct AlwaysRejectPrompter;

impl ConsentPrompter for AlwaysRejectPrompter {
    fn prompt(&mut self, _context: &PromptContext<'_>) -> PromptResponse {
        PromptResponse::Reject
    }
}

/// The versioned, on-disk project-scope consent store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConsentStoreFile {
    version: u32,
    approved_packages: Vec<String>,
    decisions: Vec<ConsentDecision>,
}

/// Project/session/once-scoped package approval.
pub struct ConsentManager {
    project_root: PathBuf,
    project_approved: BTreeSet<String>,
    session_approved: BTreeSet<String>,
    decisions: VecDeque<ConsentDecision>,
}

impl ConsentManager {
    /// Load the project-scope store from `project_root`, falling back to
    /// empty if the file is missing or fails schema validation.
    pub fn load(project_root: &Path) -> Self {
        let path = project_root.join(CONSENT_STORE_FILE);
        let file = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str::<ConsentStoreFile>(&content).ok())
            .filter(|f| f.version == 1)
            .unwrap_or_default();

        Self {
            project_root: project_root.to_path_buf(),
            project_approved: file.approved_packages.into_iter().collect(),
            session_approved: BTreeSet::new(),
            decisions: file.decisions.into_iter().collect(),
        }
    }

    /// Approve a batch of registry-valid packages, consulting the project
    /// and session stores first and falling through to `prompter` for
    /// anything undecided. Returns `None` audit events here — the caller
    /// (the orchestrator) is the sole writer of the audit log.
    pub fn approve_batch(
        &mut self,
        packages: &[Specifier],
        alternatives: &BTreeMap<Specifier, Substitute>,
        file_context: &PackageFileMap,
        install_command_for: impl Fn(&Specifier) -> String,
        prompter: &mut dyn ConsentPrompter,
    ) -> BatchApprovalResult {
        let mut result = BatchApprovalResult::default();

        for package in packages {
            let name = package.package_name();

            if self.project_approved.contains(&name) || self.session_approved.contains(&name) {
                result.approved.push(package.clone());
                continue;
            }

            let empty = Vec::new();
            let files = file_context.get(package).unwrap_or(&empty);
            let alternative = alternatives.get(package);
            let install_command = install_command_for(package);
            let context = PromptContext {
                package,
                files,
                alternative,
                install_command: &install_command,
            };

            let response = prompter.prompt(&context);
            self.record_decision(package, &response, alternative);

            match response {
                PromptResponse::ApproveOnce => result.approved.push(package.clone()),
                PromptResponse::ApproveSession => {
                    self.session_approved.insert(name);
                    result.approved.push(package.clone());
                }
                PromptResponse::ApproveProject => {
                    self.project_approved.insert(name);
                    self.persist();
                    result.approved.push(package.clone());
                }
                PromptResponse::Reject => result.rejected.push(package.clone()),
                PromptResponse::UseAlternative => {
                    if let Some(sub) = alternative {
                        result.alternatives.insert(package.clone(), sub.module.clone());
                    } else {
                        result.rejected.push(package.clone());
                    }
                }
            }
        }

        result
    }

    /// Non-interactive bypass: every package is approved without consulting
    /// the prompter or either store.
    pub fn approve_all_auto(packages: &[Specifier]) -> BatchApprovalResult {
        BatchApprovalResult {
            approved: packages.to_vec(),
            alternatives: BTreeMap::new(),
            rejected: Vec::new(),
        }
    }

    fn record_decision(&mut self, package: &Specifier, response: &PromptResponse, alternative: Option<&Substitute>) {
        let (scope, approved, use_alternative) = match response {
            PromptResponse::ApproveOnce => (ConsentScope::Once, true, None),
            PromptResponse::ApproveSession => (ConsentScope::Session, true, None),
            PromptResponse::ApproveProject => (ConsentScope::Project, true, None),
            PromptResponse::Reject => (ConsentScope::Once, false, None),
            PromptResponse::UseAlternative => (
                ConsentScope::Once,
                false,
                alternative.map(|s| s.module.clone()),
            ),
        };

        self.decisions.push_back(ConsentDecision {
            package: package.package_name(),
            scope,
            approved,
            use_alternative,
        });

        while self.decisions.len() > MAX_PERSISTED_DECISIONS {
            self.decisions.pop_front();
        }
    }

    /// Re-write the project-scope store in full. Best-effort: a write
    /// failure is swallowed, matching the advisory nature of this store.
    fn persist(&self) {
        let file = ConsentStoreFile {
            version: 1,
            approved_packages: self.project_approved.iter().cloned().collect(),
            decisions: self.decisions.iter().cloned().collect(),
        };

        if let Ok(json) = serde_json::to_string_pretty(&file) {
            let _ = fs::write(self.project_root.join(CONSENT_STORE_FILE), json);
        }
    }
}

/// Build an audit event for one recorded decision, for the orchestrator to
/// append to the audit log.
pub fn decision_audit_event(package: &Specifier, response: &PromptResponse) -> AuditEvent {
    AuditEvent {
        timestamp: Utc::now(),
        kind: AuditEventKind::ConsentDecision,
        package: Some(package.package_name()),
        detail: format!("{response:?}"),
    }
}
