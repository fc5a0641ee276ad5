//! Pipeline configuration and the explicit logging capability (§4.0).
//!
//! No ambient global logger: every component that produces user-visible
//! output is handed a `Reporter` at construction or call time. The CLI's
//! concrete `Reporter` writes leveled lines to stderr; tests inject
//! [`NullReporter`] or a recording fake.
//!
//! Configuration is assembled once at process start by merging, lowest to
//! highest precedence: built-in defaults, a project config file
//! (`depforge.toml`), then recognised environment variables. A malformed
//! project config file is a hard error — it is operator-authored, unlike the
//! advisory consent store.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use depforge_types::{PipelineError, Result};

pub const CONFIG_FILE: &str = "depforge.toml";

const DEFAULT_REGISTRY_BASE_URL: &str = "https://registry.npmjs.org";
const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_IMPORT_RETRIES: u32 = 3;

/// Everything the language-model transport needs, recognised via env vars
/// (`DEPFORGE_LLM_ENDPOINT`, `DEPFORGE_LLM_MODEL`, `DEPFORGE_LLM_API_KEY`,
/// `DEPFORGE_LLM_MAX_TOKENS`) or the project config file's `[llm]` table.
/// The core never inspects these beyond plumbing them to the coder
/// transport, which is an external collaborator (§6).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
}

/// The merged, immutable configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub project_root: PathBuf,
    pub registry_base_url: String,
    pub registry_timeout: Duration,
    pub max_import_retries: u32,
    /// CLI `--auto-approve` flag, or forced on by `non_interactive`.
    pub auto_approve: bool,
    /// `auto_approve`, OR a `CI=true`-style environment signal. The consent
    /// prompter is never invoked when this is set.
    pub non_interactive: bool,
    pub llm: LlmConfig,
}

impl PipelineConfig {
    /// Load configuration for `project_root`, merging defaults, the project
    /// config file (if present), and environment variables, in that order.
    pub fn load(project_root: &Path, cli_auto_approve: bool) -> Result<PipelineConfig> {
        let file = load_project_file(project_root)?;

        let registry_base_url = file
            .as_ref()
            .and_then(|f| f.registry.as_ref())
            .and_then(|r| r.base_url.clone())
            .unwrap_or_else(|| DEFAULT_REGISTRY_BASE_URL.to_string());

        let registry_timeout = file
            .as_ref()
            .and_then(|f| f.registry.as_ref())
            .and_then(|r| r.timeout)
            .map(|d| d.0)
            .unwrap_or(DEFAULT_REGISTRY_TIMEOUT);

        let max_import_retries = file
            .as_ref()
            .and_then(|f| f.pipeline.as_ref())
            .and_then(|p| p.max_import_retries)
            .unwrap_or(DEFAULT_MAX_IMPORT_RETRIES);

        let file_auto_approve = file
            .as_ref()
            .and_then(|f| f.pipeline.as_ref())
            .and_then(|p| p.auto_approve)
            .unwrap_or(false);

        let auto_approve = cli_auto_approve || file_auto_approve;
        let ci_signal = is_ci_environment();
        let non_interactive = auto_approve || ci_signal;

        let llm_file = file.as_ref().and_then(|f| f.llm.clone()).unwrap_or_default();
        let llm = LlmConfig {
            endpoint: env::var("DEPFORGE_LLM_ENDPOINT").ok().or(llm_file.endpoint),
            model: env::var("DEPFORGE_LLM_MODEL").ok().or(llm_file.model),
            api_key: env::var("DEPFORGE_LLM_API_KEY").ok().or(llm_file.api_key),
            max_tokens: env::var("DEPFORGE_LLM_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(llm_file.max_tokens),
        };

        Ok(PipelineConfig {
            project_root: project_root.to_path_buf(),
            registry_base_url,
            registry_timeout,
            max_import_retries,
            auto_approve,
            non_interactive,
            llm,
        })
    }
}

/// Presence of a `CI=true`-style signal forces non-interactive mode,
/// regardless of the auto-approve flag.
fn is_ci_environment() -> bool {
    env::var("CI")
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            !v.is_empty() && v != "false" && v != "0"
        })
        .unwrap_or(false)
}

fn load_project_file(project_root: &Path) -> Result<Option<ProjectConfigFile>> {
    let path = project_root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        PipelineError::Config(format!("failed to read config file {}: {e}", path.display()))
    })?;

    let parsed: ProjectConfigFile = toml::from_str(&content).map_err(|e| {
        PipelineError::Config(format!("failed to parse config file {}: {e}", path.display()))
    })?;

    Ok(Some(parsed))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectConfigFile {
    #[serde(default)]
    registry: Option<RegistryFile>,
    #[serde(default)]
    pipeline: Option<PipelineFile>,
    #[serde(default)]
    llm: Option<LlmFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout: Option<HumanDuration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PipelineFile {
    #[serde(default)]
    max_import_retries: Option<u32>,
    #[serde(default)]
    auto_approve: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LlmFile {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

/// A duration accepted either as a human-readable string (`"5s"`) or a
/// plain count of milliseconds, matching the deserialization convention
/// used elsewhere in this codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HumanDuration(Duration);

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Millis(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Millis(ms) => Ok(HumanDuration(Duration::from_millis(ms))),
            Repr::Text(s) => humantime::parse_duration(&s)
                .map(HumanDuration)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// A narrow leveled-logging capability, passed explicitly rather than
/// reached for as an ambient global. Tests inject [`NullReporter`] or a
/// recording implementation.
pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);
}

/// A `Reporter` that discards everything. Used in tests and anywhere the
/// caller has no interest in progress output.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&mut self, _msg: &str) {}
    fn warn(&mut self, _msg: &str) {}
    fn error(&mut self, _msg: &str) {}
}
