//! Install-and-repair orchestrator (C9): the per-task loop binding C2–C8
//! with the external code-generation agent.
//!
//! This is the hardest part of the pipeline. It is single-threaded and
//! cooperative at every I/O boundary: detect → extract → registry →
//! consent → prod-install → dev-install → revalidate, strictly serial
//! within one iteration. The only concurrency in the whole loop lives
//! inside [`crate::registry::RegistryClient::exists_batch`].

use std::collections::BTreeMap;
use std::path::Path;

use depforge_types::{Category, DetectionOutcome, PackageManager, Result, Specifier, Substitute};

use crate::audit::{self, AuditLog};
use crate::categorize;
use crate::coder::{Changes, CoderAgent, CoderInput, GeneratedFile};
use crate::config::{PipelineConfig, Reporter};
use crate::consent::{ConsentManager, ConsentPrompter};
use crate::detect;
use crate::feedback;
use crate::installer::{self, InstallRequest, Installer};
use crate::manifest;
use crate::registry::PackageRegistry;
use crate::validator::Validator;

/// Source file extensions the validator is run over. Mirrors the
/// extensions recognised by the categoriser's test-path suffix patterns.
const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SOURCE_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// How one task's import-repair loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// No imports are missing; the task can proceed to the (external)
    /// review loop.
    Resolved,
    /// The loop ended without resolving every import: the attempt budget
    /// was exhausted, the coder errored, or a single install-failure
    /// repair attempt was exhausted without success.
    Skipped { reason: String },
}

/// The result of running one task through the import-repair loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub files: Vec<GeneratedFile>,
    pub outcome: TaskOutcome,
    pub installed_production: Vec<Specifier>,
    pub installed_dev: Vec<Specifier>,
}

/// One accumulated pass over every generated file: every missing import,
/// its suggested fix, which files referenced it, and any curated
/// substitute. Rebuilt fresh at the top of each iteration.
#[derive(Debug, Default)]
struct Accumulated {
    missing: Vec<Specifier>,
    fixes: BTreeMap<Specifier, String>,
    package_file_map: depforge_types::PackageFileMap,
    substitutes: BTreeMap<Specifier, Substitute>,
    /// Per-file missing count, in file order, for audit logging without a
    /// second validation pass.
    file_reports: Vec<(std::path::PathBuf, usize)>,
}

fn accumulate(files: &[GeneratedFile], validator: &Validator) -> Accumulated {
    let mut acc = Accumulated::default();
    let mut seen = std::collections::BTreeSet::new();

    for file in files.iter().filter(|f| is_source_file(&f.path)) {
        let report = validator.validate(&file.content);
        acc.file_reports.push((file.path.clone(), report.missing.len()));

        for (spec, fix) in report.missing.iter().zip(report.fixes.iter()) {
            if seen.insert(spec.clone()) {
                acc.missing.push(spec.clone());
            }
            acc.fixes.entry(spec.clone()).or_insert_with(|| fix.clone());
            acc.package_file_map.entry(spec.clone()).or_default().push(file.path.clone());
        }
        for (spec, sub) in &report.substitutes {
            acc.substitutes.entry(spec.clone()).or_insert_with(|| sub.clone());
        }
    }

    acc
}

fn revalidate_all(files: &[GeneratedFile], validator: &Validator) -> bool {
    files
        .iter()
        .filter(|f| is_source_file(&f.path))
        .all(|f| validator.validate(&f.content).is_valid())
}

fn install_command_for(pm: PackageManager, package_file_map: &depforge_types::PackageFileMap) -> impl Fn(&Specifier) -> String + '_ {
    move |spec: &Specifier| {
        let empty = Vec::new();
        let paths = package_file_map.get(spec).unwrap_or(&empty);
        let category = categorize::categorize(spec, paths);
        let argv = installer::build_argv(pm, category, &[spec.package_name()]);
        format!("{} {}", pm.binary_name(), argv.join(" "))
    }
}

/// Bundles the collaborators the orchestrator drives but does not own, so
/// `run_task`'s signature stays readable. Each field is a trait object (or
/// `&mut`) so tests can substitute scripted fakes for the coder, registry,
/// installer, and consent prompter.
pub struct TaskCollaborators<'a> {
    pub coder: &'a mut dyn CoderAgent,
    pub registry: &'a dyn PackageRegistry,
    pub installer: &'a dyn Installer,
    pub consent: &'a mut ConsentManager,
    pub prompter: &'a mut dyn ConsentPrompter,
}

/// Run one task's full generate → validate → resolve → install →
/// revalidate loop.
///
/// `detection` is probed and cached by the caller (per §4.1's "called
/// exactly once per pipeline run" contract) and passed in here rather than
/// re-detected per task.
pub fn run_task(
    task: &str,
    project_root: &Path,
    config: &PipelineConfig,
    detection: &DetectionOutcome,
    collaborators: TaskCollaborators<'_>,
    audit_log: &mut AuditLog,
    reporter: &mut dyn Reporter,
) -> Result<TaskResult> {
    let TaskCollaborators { coder, registry, installer, consent, prompter } = collaborators;

    let declared = manifest::read_declared_dependencies(project_root)?;
    let mut installed_production: Vec<Specifier> = Vec::new();
    let mut installed_dev: Vec<Specifier> = Vec::new();

    let base_allow_set: Vec<Specifier> = declared
        .production
        .iter()
        .chain(declared.development.iter())
        .map(|name| Specifier::parse(name))
        .collect();

    let mut files = match coder.generate(CoderInput::initial(task)) {
        Ok(Changes { files }) => files,
        Err(err) => {
            reporter.warn(&format!("coder failed on initial generation: {err}"));
            return Ok(TaskResult {
                files: Vec::new(),
                outcome: TaskOutcome::Skipped { reason: err.to_string() },
                installed_production,
                installed_dev,
            });
        }
    };

    for attempt in 0..config.max_import_retries {
        let validator = Validator::new(
            base_allow_set
                .iter()
                .cloned()
                .chain(installed_production.iter().cloned())
                .chain(installed_dev.iter().cloned()),
        );

        let acc = accumulate(&files, &validator);
        for (path, missing_count) in &acc.file_reports {
            audit_log.record(audit::validation_result(path, *missing_count));
        }

        if acc.missing.is_empty() {
            return Ok(TaskResult {
                files,
                outcome: TaskOutcome::Resolved,
                installed_production,
                installed_dev,
            });
        }

        reporter.info(&format!(
            "attempt {}/{}: {} package(s) missing",
            attempt + 1,
            config.max_import_retries,
            acc.missing.len()
        ));

        if let DetectionOutcome::Ambiguous(candidates) = detection {
            audit_log.record(audit::ambiguous_pm(
                &candidates.iter().map(|pm| pm.binary_name()).collect::<Vec<_>>(),
            ));
            let fixes: Vec<String> = acc.missing.iter().map(|s| acc.fixes[s].clone()).collect();
            let feedback_text = feedback::rewrite_without_feedback(&acc.missing, &fixes);

            match coder.generate(CoderInput::retry(task, feedback_text)) {
                Ok(changes) => {
                    files = changes.files;
                    continue;
                }
                Err(err) => {
                    return Ok(TaskResult {
                        files,
                        outcome: TaskOutcome::Skipped { reason: err.to_string() },
                        installed_production,
                        installed_dev,
                    });
                }
            }
        }

        let pm = detection.manager().expect("non-ambiguous detection always yields a manager");

        let verdicts = registry.exists_batch(&acc.missing);
        let mut registry_valid: Vec<Specifier> = Vec::new();
        let mut registry_invalid: Vec<(Specifier, String)> = Vec::new();

        for spec in &acc.missing {
            let verdict = verdicts.get(spec);
            audit_log.record(audit::registry_verdict(&spec.package_name(), format!("{verdict:?}")));

            match verdict {
                Some(v) if v.exists() => registry_valid.push(spec.clone()),
                Some(crate::registry::ExistsVerdict::NotFound) => {
                    registry_invalid.push((spec.clone(), acc.fixes[spec].clone()));
                }
                _ => {
                    registry_invalid.push((
                        spec.clone(),
                        format!("Package \"{}\" could not be confirmed against the registry.", spec.package_name()),
                    ));
                }
            }
        }

        let approval = if config.auto_approve {
            ConsentManager::approve_all_auto(&registry_valid)
        } else {
            consent.approve_batch(
                &registry_valid,
                &acc.substitutes,
                &acc.package_file_map,
                install_command_for(pm, &acc.package_file_map),
                prompter,
            )
        };

        for spec in &approval.approved {
            audit_log.record(audit::consent_decision(&spec.package_name(), "approved"));
        }
        for spec in approval.alternatives.keys() {
            audit_log.record(audit::consent_decision(&spec.package_name(), "alternative"));
        }
        for spec in &approval.rejected {
            audit_log.record(audit::consent_decision(&spec.package_name(), "rejected"));
        }

        let mut all_installed: Vec<Specifier> = Vec::new();
        let mut install_failures: Vec<(Vec<Specifier>, depforge_types::InstallError)> = Vec::new();

        if !approval.approved.is_empty() {
            let categorized = categorize::categorize_all(
                approval
                    .approved
                    .iter()
                    .map(|spec| (spec.clone(), acc.package_file_map.get(spec).cloned().unwrap_or_default())),
            );

            if !categorized.production.is_empty() {
                run_category_install(
                    pm,
                    Category::Production,
                    &categorized.production,
                    project_root,
                    installer,
                    audit_log,
                    reporter,
                    &mut installed_production,
                    &mut all_installed,
                    &mut install_failures,
                )?;
            }

            if !categorized.dev.is_empty() {
                run_category_install(
                    pm,
                    Category::Development,
                    &categorized.dev,
                    project_root,
                    installer,
                    audit_log,
                    reporter,
                    &mut installed_dev,
                    &mut all_installed,
                    &mut install_failures,
                )?;
            }

            if !all_installed.is_empty() {
                let revalidated = Validator::new(
                    base_allow_set
                        .iter()
                        .cloned()
                        .chain(installed_production.iter().cloned())
                        .chain(installed_dev.iter().cloned()),
                );
                if revalidate_all(&files, &revalidated) {
                    return Ok(TaskResult {
                        files,
                        outcome: TaskOutcome::Resolved,
                        installed_production,
                        installed_dev,
                    });
                }
            }
        }

        if !approval.alternatives.is_empty() {
            let chosen: BTreeMap<Specifier, Substitute> = approval
                .alternatives
                .keys()
                .filter_map(|spec| acc.substitutes.get(spec).map(|sub| (spec.clone(), sub.clone())))
                .collect();
            let feedback_text = feedback::alternative_feedback(&chosen);
            match coder.generate(CoderInput::retry(task, feedback_text)) {
                Ok(changes) => {
                    files = changes.files;
                    continue;
                }
                Err(err) => {
                    return Ok(TaskResult {
                        files,
                        outcome: TaskOutcome::Skipped { reason: err.to_string() },
                        installed_production,
                        installed_dev,
                    });
                }
            }
        }

        // An install failure gets exactly one repair attempt, then the
        // loop ends regardless of its outcome, whether or not another
        // category's install succeeded in the same iteration.
        if !install_failures.is_empty() {
            let feedback_text = install_failures
                .iter()
                .map(|(pkgs, err)| feedback::install_failure_feedback(err, pkgs, pm))
                .collect::<Vec<_>>()
                .join("\n\n");

            return match coder.generate(CoderInput::retry(task, feedback_text)) {
                Ok(changes) => Ok(TaskResult {
                    files: changes.files,
                    outcome: TaskOutcome::Skipped {
                        reason: "install failure repair attempt exhausted".to_string(),
                    },
                    installed_production,
                    installed_dev,
                }),
                Err(err) => Ok(TaskResult {
                    files,
                    outcome: TaskOutcome::Skipped { reason: err.to_string() },
                    installed_production,
                    installed_dev,
                }),
            };
        }

        if !registry_invalid.is_empty() || !approval.rejected.is_empty() {
            let feedback_text = feedback::rejection_feedback(&approval.rejected, &registry_invalid);
            match coder.generate(CoderInput::retry(task, feedback_text)) {
                Ok(changes) => {
                    files = changes.files;
                    continue;
                }
                Err(err) => {
                    return Ok(TaskResult {
                        files,
                        outcome: TaskOutcome::Skipped { reason: err.to_string() },
                        installed_production,
                        installed_dev,
                    });
                }
            }
        }
    }

    Ok(TaskResult {
        files,
        outcome: TaskOutcome::Skipped { reason: "import-repair attempt budget exhausted".to_string() },
        installed_production,
        installed_dev,
    })
}

/// Run one category's install, wrapped in its own backup/restore
/// transaction. Shared by the production and development legs of the
/// loop, which are otherwise identical apart from which accumulator and
/// manifest section they affect.
#[allow(clippy::too_many_arguments)]
fn run_category_install(
    pm: PackageManager,
    category: Category,
    packages: &[Specifier],
    project_root: &Path,
    installer: &dyn Installer,
    audit_log: &mut AuditLog,
    reporter: &mut dyn Reporter,
    installed_accumulator: &mut Vec<Specifier>,
    all_installed: &mut Vec<Specifier>,
    install_failures: &mut Vec<(Vec<Specifier>, depforge_types::InstallError)>,
) -> Result<()> {
    let backup_state = crate::backup::create(project_root, pm)?;
    audit_log.record(audit::backup_created(&backup_state.manifest.backup_path));

    let request =
        InstallRequest { manager: pm, packages, project_root, category };

    match installer.install(request) {
        Ok(result) => {
            crate::backup::cleanup(&backup_state);
            audit_log.record(audit::backup_cleaned(&backup_state.manifest.backup_path));
            audit_log.record(audit::install_outcome(category_label(category), "ok"));
            reporter.info(&format!("installed {} {:?} package(s)", result.packages.len(), category));
            installed_accumulator.extend(packages.iter().cloned());
            all_installed.extend(packages.iter().cloned());
        }
        Err(err) => {
            crate::backup::restore(&backup_state)?;
            audit_log.record(audit::backup_restored(&backup_state.manifest.backup_path));
            audit_log.record(audit::install_outcome(category_label(category), format!("{err:?}")));
            reporter.warn(&format!("install failed for {:?}: {err:?}", category));
            install_failures.push((packages.to_vec(), err));
        }
    }

    Ok(())
}

fn category_label(category: Category) -> &'static str {
    match category {
        Category::Production => "production",
        Category::Development => "development",
    }
}

/// A dry-run pass for the `plan` CLI surface (§6): runs validation and
/// consent-less registry checks against the *current* state of the
/// project (no coder call, no retry loop) and MUST NOT call the installer.
pub fn plan_task(task_files: &[GeneratedFile], project_root: &Path, registry: &dyn PackageRegistry) -> Result<PlanReport> {
    let declared = manifest::read_declared_dependencies(project_root)?;
    let base_allow_set: Vec<Specifier> =
        declared.production.iter().chain(declared.development.iter()).map(|name| Specifier::parse(name)).collect();

    let validator = Validator::new(base_allow_set);
    let acc = accumulate(task_files, &validator);

    if acc.missing.is_empty() {
        return Ok(PlanReport { valid: true, ..PlanReport::default() });
    }

    let verdicts = registry.exists_batch(&acc.missing);
    let mut would_install = Vec::new();
    let mut not_on_registry = Vec::new();
    let mut substitutable = Vec::new();

    for spec in &acc.missing {
        if acc.substitutes.contains_key(spec) {
            substitutable.push(spec.clone());
        } else if verdicts.get(spec).map(|v| v.exists()).unwrap_or(false) {
            would_install.push(spec.clone());
        } else {
            not_on_registry.push(spec.clone());
        }
    }

    Ok(PlanReport { valid: false, would_install, not_on_registry, substitutable })
}

/// What `plan_task` found, without ever touching the installer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanReport {
    pub valid: bool,
    pub would_install: Vec<Specifier>,
    pub not_on_registry: Vec<Specifier>,
    pub substitutable: Vec<Specifier>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::CoderError;
    use crate::consent::PromptResponse;
    use crate::registry::ExistsVerdict;
    use depforge_types::{InstallError, PipelineError};
    use std::collections::BTreeMap as Map;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn file(path: &str, content: &str) -> GeneratedFile {
        GeneratedFile { path: PathBuf::from(path), content: content.to_string() }
    }

    fn config(max_retries: u32, auto_approve: bool) -> PipelineConfig {
        PipelineConfig {
            project_root: PathBuf::from("."),
            registry_base_url: "https://registry.npmjs.org".to_string(),
            registry_timeout: std::time::Duration::from_secs(5),
            max_import_retries: max_retries,
            auto_approve,
            non_interactive: auto_approve,
            llm: Default::default(),
        }
    }

    struct ScriptedCoder {
        outputs: Vec<Result<Changes>>,
    }

    impl CoderAgent for ScriptedCoder {
        fn generate(&mut self, _input: CoderInput) -> std::result::Result<Changes, CoderError> {
            match self.outputs.remove(0) {
                Ok(c) => Ok(c),
                Err(e) => Err(CoderError(e.to_string())),
            }
        }
    }

    struct FakeRegistry {
        verdicts: Map<Specifier, ExistsVerdict>,
    }

    impl PackageRegistry for FakeRegistry {
        fn exists_batch(&self, specifiers: &[Specifier]) -> Map<Specifier, ExistsVerdict> {
            specifiers
                .iter()
                .map(|s| (s.clone(), self.verdicts.get(s).cloned().unwrap_or(ExistsVerdict::NotFound)))
                .collect()
        }
    }

    struct FakeInstaller {
        fail: bool,
    }

    impl Installer for FakeInstaller {
        fn install(&self, request: InstallRequest<'_>) -> std::result::Result<depforge_types::InstallResult, InstallError> {
            if self.fail {
                Err(InstallError::InstallFailed { exit_code: Some(1) })
            } else {
                Ok(depforge_types::InstallResult { packages: request.packages.to_vec(), category: request.category })
            }
        }
    }

    struct ScriptedPrompter {
        responses: Vec<PromptResponse>,
    }

    impl ConsentPrompter for ScriptedPrompter {
        fn prompt(&mut self, _context: &crate::consent::PromptContext<'_>) -> PromptResponse {
            self.responses.remove(0)
        }
    }

    fn bare(name: &str) -> Specifier {
        Specifier::Bare(name.to_string())
    }

    /// S1: happy path prod dep, user approves, install succeeds, loop breaks.
    #[test]
    fn resolves_when_approved_package_installs_successfully() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("pnpm-lock.yaml"), "").expect("write lock");

        let mut coder = ScriptedCoder {
            outputs: vec![Ok(Changes { files: vec![file("src/a.js", r#"import x from "zod";"#)] })],
        };
        let registry = FakeRegistry { verdicts: Map::from([(bare("zod"), ExistsVerdict::Exists)]) };
        let installer = FakeInstaller { fail: false };
        let mut consent = ConsentManager::load(dir.path());
        let mut prompter = ScriptedPrompter { responses: vec![PromptResponse::ApproveOnce] };
        let mut audit_log = AuditLog::new();
        let mut reporter = crate::config::NullReporter;

        let detection = detect::detect(dir.path());
        let result = run_task(
            "build a fetcher",
            dir.path(),
            &config(3, false),
            &detection,
            TaskCollaborators {
                coder: &mut coder,
                registry: &registry,
                installer: &installer,
                consent: &mut consent,
                prompter: &mut prompter,
            },
            &mut audit_log,
            &mut reporter,
        )
        .expect("run_task");

        assert_eq!(result.outcome, TaskOutcome::Resolved);
        assert_eq!(result.installed_production, vec![bare("zod")]);
        assert!(!audit_log.is_empty());
    }

    /// S2: dev dep imported only from a test file, auto-approve on.
    #[test]
    fn dev_dependency_from_test_file_installs_as_development() {
        let dir = tempdir().expect("tempdir");

        let mut coder = ScriptedCoder {
            outputs: vec![Ok(Changes { files: vec![file("test/a.test.js", r#"import x from "chai";"#)] })],
        };
        let registry = FakeRegistry { verdicts: Map::from([(bare("chai"), ExistsVerdict::Exists)]) };
        let installer = FakeInstaller { fail: false };
        let mut consent = ConsentManager::load(dir.path());
        let mut prompter = ScriptedPrompter { responses: vec![] };
        let mut audit_log = AuditLog::new();
        let mut reporter = crate::config::NullReporter;

        let detection = detect::detect(dir.path());
        assert_eq!(detection, DetectionOutcome::Detected(PackageManager::Npm));

        let result = run_task(
            "add tests",
            dir.path(),
            &config(3, true),
            &detection,
            TaskCollaborators {
                coder: &mut coder,
                registry: &registry,
                installer: &installer,
                consent: &mut consent,
                prompter: &mut prompter,
            },
            &mut audit_log,
            &mut reporter,
        )
        .expect("run_task");

        assert_eq!(result.outcome, TaskOutcome::Resolved);
        assert!(result.installed_production.is_empty());
        assert_eq!(result.installed_dev, vec![bare("chai")]);
    }

    /// S3: user picks the built-in substitute; installer must never be called.
    #[test]
    fn substitution_choice_never_calls_the_installer() {
        let dir = tempdir().expect("tempdir");

        let mut coder = ScriptedCoder {
            outputs: vec![
                Ok(Changes { files: vec![file("src/a.js", r#"import { v4 } from "uuid";"#)] }),
                Ok(Changes { files: vec![file("src/a.js", r#"import { randomUUID } from "node:crypto";"#)] }),
            ],
        };
        let registry = FakeRegistry { verdicts: Map::from([(bare("uuid"), ExistsVerdict::Exists)]) };
        struct PanicInstaller;
        impl Installer for PanicInstaller {
            fn install(&self, _request: InstallRequest<'_>) -> std::result::Result<depforge_types::InstallResult, InstallError> {
                panic!("installer must not be called when the user chooses a substitute");
            }
        }
        let installer = PanicInstaller;
        let mut consent = ConsentManager::load(dir.path());
        let mut prompter = ScriptedPrompter { responses: vec![PromptResponse::UseAlternative] };
        let mut audit_log = AuditLog::new();
        let mut reporter = crate::config::NullReporter;

        let detection = detect::detect(dir.path());
        let result = run_task(
            "generate an id",
            dir.path(),
            &config(3, false),
            &detection,
            TaskCollaborators {
                coder: &mut coder,
                registry: &registry,
                installer: &installer,
                consent: &mut consent,
                prompter: &mut prompter,
            },
            &mut audit_log,
            &mut reporter,
        )
        .expect("run_task");

        assert_eq!(result.outcome, TaskOutcome::Resolved);
    }

    /// S4: registry 404 means no consent prompt and a "does not exist" feedback retry.
    #[test]
    fn registry_404_skips_consent_and_feeds_back_not_found() {
        let dir = tempdir().expect("tempdir");

        let mut coder = ScriptedCoder {
            outputs: vec![
                Ok(Changes { files: vec![file("src/a.js", r#"import x from "not-a-real-pkg-xyz";"#)] }),
                Ok(Changes { files: vec![file("src/a.js", "// rewritten without the package")] }),
            ],
        };
        let registry = FakeRegistry { verdicts: Map::from([(bare("not-a-real-pkg-xyz"), ExistsVerdict::NotFound)]) };
        struct PanicInstaller;
        impl Installer for PanicInstaller {
            fn install(&self, _request: InstallRequest<'_>) -> std::result::Result<depforge_types::InstallResult, InstallError> {
                panic!("installer must not be called for a registry-invalid package");
            }
        }
        let installer = PanicInstaller;
        let mut consent = ConsentManager::load(dir.path());
        struct PanicPrompter;
        impl ConsentPrompter for PanicPrompter {
            fn prompt(&mut self, _context: &crate::consent::PromptContext<'_>) -> PromptResponse {
                panic!("consent must not be prompted for a registry-invalid package");
            }
        }
        let mut prompter = PanicPrompter;
        let mut audit_log = AuditLog::new();
        let mut reporter = crate::config::NullReporter;

        let detection = detect::detect(dir.path());
        let result = run_task(
            "fetch something",
            dir.path(),
            &config(3, false),
            &detection,
            TaskCollaborators {
                coder: &mut coder,
                registry: &registry,
                installer: &installer,
                consent: &mut consent,
                prompter: &mut prompter,
            },
            &mut audit_log,
            &mut reporter,
        )
        .expect("run_task");

        assert_eq!(result.outcome, TaskOutcome::Resolved);
    }

    /// S5: dev install fails after a successful prod install; prod is preserved,
    /// dev is rolled back, and the loop ends after a single repair attempt.
    #[test]
    fn dev_install_failure_preserves_successful_prod_install() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("package.json"), r#"{"dependencies":{},"devDependencies":{}}"#)
            .expect("write manifest");

        let mut coder = ScriptedCoder {
            outputs: vec![
                Ok(Changes {
                    files: vec![
                        file("src/a.js", r#"import x from "fastify";"#),
                        file("test/a.test.js", r#"import y from "made-up-broken";"#),
                    ],
                }),
                Ok(Changes { files: vec![file("src/a.js", r#"import x from "fastify";"#)] }),
            ],
        };
        let registry = FakeRegistry {
            verdicts: Map::from([(bare("fastify"), ExistsVerdict::Exists), (bare("made-up-broken"), ExistsVerdict::Exists)]),
        };

        struct SelectiveFailInstaller;
        impl Installer for SelectiveFailInstaller {
            fn install(&self, request: InstallRequest<'_>) -> std::result::Result<depforge_types::InstallResult, InstallError> {
                if request.category == Category::Development {
                    Err(InstallError::InstallFailed { exit_code: Some(1) })
                } else {
                    Ok(depforge_types::InstallResult { packages: request.packages.to_vec(), category: request.category })
                }
            }
        }
        let installer = SelectiveFailInstaller;
        let mut consent = ConsentManager::load(dir.path());
        let mut prompter =
            ScriptedPrompter { responses: vec![PromptResponse::ApproveOnce, PromptResponse::ApproveOnce] };
        let mut audit_log = AuditLog::new();
        let mut reporter = crate::config::NullReporter;

        let detection = detect::detect(dir.path());
        let result = run_task(
            "add a server and a broken test dep",
            dir.path(),
            &config(3, false),
            &detection,
            TaskCollaborators {
                coder: &mut coder,
                registry: &registry,
                installer: &installer,
                consent: &mut consent,
                prompter: &mut prompter,
            },
            &mut audit_log,
            &mut reporter,
        )
        .expect("run_task");

        assert_eq!(result.installed_production, vec![bare("fastify")]);
        assert!(result.installed_dev.is_empty());
        assert!(matches!(result.outcome, TaskOutcome::Skipped { .. }));
    }

    /// S6: two lock files present means installation never runs at all.
    #[test]
    fn ambiguous_detection_never_invokes_the_installer() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("package-lock.json"), "").expect("write lock");
        std::fs::write(dir.path().join("pnpm-lock.yaml"), "").expect("write lock");

        let mut coder = ScriptedCoder {
            outputs: vec![
                Ok(Changes { files: vec![file("src/a.js", r#"import x from "zod";"#)] }),
                Ok(Changes { files: vec![file("src/a.js", "// rewritten without zod")] }),
            ],
        };
        let registry = FakeRegistry { verdicts: Map::new() };
        struct PanicInstaller;
        impl Installer for PanicInstaller {
            fn install(&self, _request: InstallRequest<'_>) -> std::result::Result<depforge_types::InstallResult, InstallError> {
                panic!("installer must never run when detection is ambiguous");
            }
        }
        let installer = PanicInstaller;
        let mut consent = ConsentManager::load(dir.path());
        struct PanicPrompter;
        impl ConsentPrompter for PanicPrompter {
            fn prompt(&mut self, _context: &crate::consent::PromptContext<'_>) -> PromptResponse {
                panic!("consent must never be reached when detection is ambiguous");
            }
        }
        let mut prompter = PanicPrompter;
        let mut audit_log = AuditLog::new();
        let mut reporter = crate::config::NullReporter;

        let detection = detect::detect(dir.path());
        assert!(matches!(detection, DetectionOutcome::Ambiguous(_)));

        let result = run_task(
            "build something",
            dir.path(),
            &config(3, false),
            &detection,
            TaskCollaborators {
                coder: &mut coder,
                registry: &registry,
                installer: &installer,
                consent: &mut consent,
                prompter: &mut prompter,
            },
            &mut audit_log,
            &mut reporter,
        )
        .expect("run_task");

        assert_eq!(result.outcome, TaskOutcome::Resolved);
    }

    #[test]
    fn coder_error_on_initial_generation_skips_the_task() {
        let dir = tempdir().expect("tempdir");
        let mut coder = ScriptedCoder { outputs: vec![Err(PipelineError::Coder("transport down".to_string()))] };
        let registry = FakeRegistry { verdicts: Map::new() };
        let installer = FakeInstaller { fail: false };
        let mut consent = ConsentManager::load(dir.path());
        let mut prompter = ScriptedPrompter { responses: vec![] };
        let mut audit_log = AuditLog::new();
        let mut reporter = crate::config::NullReporter;

        let detection = detect::detect(dir.path());
        let result = run_task(
            "anything",
            dir.path(),
            &config(3, false),
            &detection,
            TaskCollaborators {
                coder: &mut coder,
                registry: &registry,
                installer: &installer,
                consent: &mut consent,
                prompter: &mut prompter,
            },
            &mut audit_log,
            &mut reporter,
        )
        .expect("run_task");

        assert!(matches!(result.outcome, TaskOutcome::Skipped { .. }));
    }

    #[test]
    fn exhausting_the_retry_budget_skips_the_task() {
        let dir = tempdir().expect("tempdir");

        let mut coder = ScriptedCoder {
            outputs: vec![
                Ok(Changes { files: vec![file("src/a.js", r#"import x from "left-pad";"#)] }),
                Ok(Changes { files: vec![file("src/a.js", r#"import x from "left-pad";"#)] }),
                Ok(Changes { files: vec![file("src/a.js", r#"import x from "left-pad";"#)] }),
            ],
        };
        let registry = FakeRegistry { verdicts: Map::from([(bare("left-pad"), ExistsVerdict::NotFound)]) };
        let installer = FakeInstaller { fail: false };
        let mut consent = ConsentManager::load(dir.path());
        let mut prompter = ScriptedPrompter { responses: vec![] };
        let mut audit_log = AuditLog::new();
        let mut reporter = crate::config::NullReporter;

        let detection = detect::detect(dir.path());
        let result = run_task(
            "anything",
            dir.path(),
            &config(2, false),
            &detection,
            TaskCollaborators {
                coder: &mut coder,
                registry: &registry,
                installer: &installer,
                consent: &mut consent,
                prompter: &mut prompter,
            },
            &mut audit_log,
            &mut reporter,
        )
        .expect("run_task");

        assert_eq!(
            result.outcome,
            TaskOutcome::Skipped { reason: "import-repair attempt budget exhausted".to_string() }
        );
    }

    #[test]
    fn plan_task_never_touches_the_installer_and_reports_registry_split() {
        let dir = tempdir().expect("tempdir");
        let files = vec![
            file("src/a.js", r#"import x from "fastify"; import { v4 } from "uuid"; import y from "not-a-real-pkg-xyz";"#),
        ];
        let registry = FakeRegistry {
            verdicts: Map::from([(bare("fastify"), ExistsVerdict::Exists), (bare("not-a-real-pkg-xyz"), ExistsVerdict::NotFound)]),
        };

        let report = plan_task(&files, dir.path(), &registry).expect("plan");
        assert!(!report.valid);
        assert_eq!(report.would_install, vec![bare("fastify")]);
        assert_eq!(report.not_on_registry, vec![bare("not-a-real-pkg-xyz")]);
        assert_eq!(report.substitutable, vec![bare("uuid")]);
    }

    #[test]
    fn plan_task_is_valid_when_nothing_is_missing() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("package.json"), r#"{"dependencies":{"fastify":"^4.0.0"}}"#)
            .expect("write manifest");
        let files = vec![file("src/a.js", r#"import x from "fastify";"#)];
        let registry = FakeRegistry { verdicts: Map::new() };

        let report = plan_task(&files, dir.path(), &registry).expect("plan");
        assert!(report.valid);
    }
}
