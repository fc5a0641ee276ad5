use std::io::{self, BufRead, Write as _};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use depforge::audit::{self, AuditLog};
use depforge::coder::{Changes, CoderAgent, CoderError, CoderInput, GeneratedFile};
use depforge::config::{LlmConfig, PipelineConfig, Reporter};
use depforge::consent::{ConsentManager, ConsentPrompter, PromptContext, PromptResponse};
use depforge::detect;
use depforge::installer::SystemInstaller;
use depforge::orchestrator::{self, TaskCollaborators, TaskOutcome};
use depforge::registry::RegistryClient;

#[derive(Parser, Debug)]
#[command(name = "depforge", version)]
#[command(about = "Install-and-repair pipeline: resolves a code generator's imports against a package registry and drives consented installation.")]
struct Cli {
    /// Project root containing the manifest, lock file, and consent store.
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Approve every registry-valid package without prompting.
    #[arg(long)]
    auto_approve: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline for a natural-language task.
    Run {
        /// The task description handed to the coder agent.
        request: String,
    },
    /// Dry run: validate and check the registry without installing anything.
    Plan {
        /// The task description handed to the coder agent.
        request: String,
    },
    /// Check connectivity to the configured language-model endpoint.
    Doctor,
}

struct CliReporter;

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        eprintln!("[info] {msg}");
    }

    fn warn(&mut self, msg: &str) {
        eprintln!("[warn] {msg}");
    }

    fn error(&mut self, msg: &str) {
        eprintln!("[error] {msg}");
    }
}

/// Reads one consent decision per package from stdin. Unrecognised input
/// (including EOF, so a non-interactive pipe never hangs) is a rejection.
struct TerminalConsentPrompter;

impl ConsentPrompter for TerminalConsentPrompter {
    fn prompt(&mut self, context: &PromptContext<'_>) -> PromptResponse {
        let name = context.package.package_name();
        eprintln!("\npackage \"{name}\" is not declared and not installed.");
        if !context.files.is_empty() {
            eprintln!(
                "  imported from: {}",
                context.files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
            );
        }
        eprintln!("  would run: {}", context.install_command);
        if let Some(sub) = context.alternative {
            eprintln!("  built-in alternative available: {} ({})", sub.module, sub.description);
        }

        let prompt = if context.alternative.is_some() {
            "approve [o]nce / [s]ession / [p]roject / [u]se alternative / [n]o? "
        } else {
            "approve [o]nce / [s]ession / [p]roject / [n]o? "
        };
        eprint!("{prompt}");
        let _ = io::stderr().flush();

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).unwrap_or(0) == 0 {
            return PromptResponse::Reject;
        }

        match line.trim().to_ascii_lowercase().as_str() {
            "o" | "once" | "y" | "yes" => PromptResponse::ApproveOnce,
            "s" | "session" => PromptResponse::ApproveSession,
            "p" | "project" | "always" => PromptResponse::ApproveProject,
            "u" | "use" | "alt" | "alternative" if context.alternative.is_some() => PromptResponse::UseAlternative,
            _ => PromptResponse::Reject,
        }
    }
}

/// The request/response shapes for an OpenAI-compatible `/chat/completions`
/// endpoint. Only the fields the coder actually reads are modelled.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// The JSON object the coder is instructed to answer with: the complete set
/// of files for this attempt.
#[derive(Debug, Deserialize)]
struct RawChanges {
    files: Vec<RawFile>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    path: String,
    content: String,
}

const SYSTEM_PROMPT: &str = "You are a code generation agent. Respond with a single JSON object \
of the shape {\"files\":[{\"path\":\"relative/path.ext\",\"content\":\"...\"}]} and nothing else. \
No markdown fences, no commentary outside the JSON object.";

/// Structured generation over an OpenAI-compatible chat endpoint. The
/// orchestrator never sees this type, only the `CoderAgent` trait.
struct LlmCoderAgent {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: Option<u32>,
}

impl LlmCoderAgent {
    fn new(llm: &LlmConfig, timeout: Duration) -> Result<Self, CoderError> {
        let endpoint = llm
            .endpoint
            .clone()
            .ok_or_else(|| CoderError("no language-model endpoint configured".to_string()))?;
        let model = llm.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoderError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, endpoint, model, api_key: llm.api_key.clone(), max_tokens: llm.max_tokens })
    }

    fn complete(&self, messages: Vec<ChatMessage>) -> Result<ChatMessage, CoderError> {
        let request = ChatRequest { model: self.model.clone(), messages, max_tokens: self.max_tokens };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().map_err(|e| CoderError(format!("request to language model failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoderError(format!("language model returned status {status}")));
        }

        let parsed: ChatResponse =
            response.json().map_err(|e| CoderError(format!("malformed chat completion response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| CoderError("chat completion returned no choices".to_string()))
    }
}

impl CoderAgent for LlmCoderAgent {
    fn generate(&mut self, input: CoderInput) -> Result<Changes, CoderError> {
        let mut user_content = input.task.clone();
        if let Some(feedback) = &input.feedback {
            user_content.push_str("\n\n");
            user_content.push_str(feedback);
        }

        let messages = vec![
            ChatMessage { role: "system".to_string(), content: SYSTEM_PROMPT.to_string() },
            ChatMessage { role: "user".to_string(), content: user_content },
        ];

        let reply = self.complete(messages)?;
        let raw: RawChanges = serde_json::from_str(&reply.content)
            .map_err(|e| CoderError(format!("could not parse coder output as JSON: {e}")))?;

        Ok(Changes {
            files: raw
                .files
                .into_iter()
                .map(|f| GeneratedFile { path: PathBuf::from(f.path), content: f.content })
                .collect(),
        })
    }
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[error] {err:#}");
            2
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let mut reporter = CliReporter;
    let config = PipelineConfig::load(&cli.project_root, cli.auto_approve).context("loading pipeline configuration")?;

    match cli.cmd {
        Commands::Run { request } => run_pipeline(&cli.project_root, &config, &request, &mut reporter),
        Commands::Plan { request } => run_plan(&cli.project_root, &config, &request, &mut reporter),
        Commands::Doctor => run_doctor(&config),
    }
}

fn run_pipeline(project_root: &PathBuf, config: &PipelineConfig, request: &str, reporter: &mut CliReporter) -> Result<i32> {
    let detection = detect::detect(project_root);
    let registry = RegistryClient::new(config.registry_base_url.clone(), config.registry_timeout);
    let installer = SystemInstaller;
    let mut consent = ConsentManager::load(project_root);
    let mut coder = LlmCoderAgent::new(&config.llm, config.registry_timeout).context("configuring the coder agent")?;
    let mut audit_log = AuditLog::new();

    if let depforge_types::DetectionOutcome::Detected(pm) = &detection {
        audit_log.record(audit::detected_pm(pm.binary_name()));
    }

    let collaborators = if config.non_interactive {
        let mut prompter = depforge::consent::AlwaysRejectPrompter;
        run_task_with(
            request,
            project_root,
            config,
            &detection,
            &mut coder,
            &registry,
            &installer,
            &mut consent,
            &mut prompter,
            &mut audit_log,
            reporter,
        )
    } else {
        let mut prompter = TerminalConsentPrompter;
        run_task_with(
            request,
            project_root,
            config,
            &detection,
            &mut coder,
            &registry,
            &installer,
            &mut consent,
            &mut prompter,
            &mut audit_log,
            reporter,
        )
    }?;

    audit_log.write_to_file(&audit::audit_log_path(project_root)).context("writing audit log")?;

    match collaborators.outcome {
        TaskOutcome::Resolved => {
            reporter.info("task resolved: every import is installed or declared");
            Ok(0)
        }
        TaskOutcome::Skipped { reason } => {
            reporter.warn(&format!("task skipped: {reason}"));
            Ok(1)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_task_with(
    request: &str,
    project_root: &PathBuf,
    config: &PipelineConfig,
    detection: &depforge_types::DetectionOutcome,
    coder: &mut dyn CoderAgent,
    registry: &RegistryClient,
    installer: &SystemInstaller,
    consent: &mut ConsentManager,
    prompter: &mut dyn ConsentPrompter,
    audit_log: &mut AuditLog,
    reporter: &mut dyn Reporter,
) -> Result<orchestrator::TaskResult> {
    orchestrator::run_task(
        request,
        project_root,
        config,
        detection,
        TaskCollaborators { coder, registry, installer, consent, prompter },
        audit_log,
        reporter,
    )
    .context("running the install-and-repair pipeline")
}

fn run_plan(project_root: &PathBuf, config: &PipelineConfig, request: &str, reporter: &mut CliReporter) -> Result<i32> {
    let registry = RegistryClient::new(config.registry_base_url.clone(), config.registry_timeout);
    let mut coder = LlmCoderAgent::new(&config.llm, config.registry_timeout).context("configuring the coder agent")?;

    let changes = coder.generate(CoderInput::initial(request)).map_err(|e| anyhow::anyhow!(e.0))?;
    let report = orchestrator::plan_task(&changes.files, project_root, &registry).context("planning the task")?;

    println!("valid: {}", report.valid);
    println!("would install: {}", format_specs(&report.would_install));
    println!("not on registry: {}", format_specs(&report.not_on_registry));
    println!("substitutable: {}", format_specs(&report.substitutable));

    if report.valid {
        reporter.info("nothing to install; every import is already resolvable");
        Ok(0)
    } else {
        Ok(1)
    }
}

fn format_specs(specs: &[depforge_types::Specifier]) -> String {
    if specs.is_empty() {
        return "(none)".to_string();
    }
    specs.iter().map(|s| s.package_name()).collect::<Vec<_>>().join(", ")
}

fn run_doctor(config: &PipelineConfig) -> Result<i32> {
    let Some(endpoint) = config.llm.endpoint.clone() else {
        bail!("no language-model endpoint configured (set DEPFORGE_LLM_ENDPOINT or [llm].endpoint)");
    };

    let coder = LlmCoderAgent::new(&config.llm, config.registry_timeout).context("configuring the coder agent")?;

    let ping = vec![ChatMessage { role: "user".to_string(), content: "ping".to_string() }];
    match coder.complete(ping) {
        Ok(_) => {
            println!("ok: reached {endpoint} as model \"{}\"", coder.model);
            Ok(0)
        }
        Err(err) => {
            bail!("language-model endpoint {endpoint} is unreachable: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_specs_joins_package_names() {
        let specs = vec![depforge_types::Specifier::Bare("zod".to_string())];
        assert_eq!(format_specs(&specs), "zod");
        assert_eq!(format_specs(&[]), "(none)");
    }

    #[test]
    fn cli_parses_run_subcommand_with_auto_approve() {
        let cli = Cli::parse_from(["depforge", "--auto-approve", "run", "build a fetcher"]);
        assert!(cli.auto_approve);
        assert!(matches!(cli.cmd, Commands::Run { request } if request == "build a fetcher"));
    }

    #[test]
    fn cli_parses_plan_subcommand() {
        let cli = Cli::parse_from(["depforge", "plan", "add a test"]);
        assert!(matches!(cli.cmd, Commands::Plan { request } if request == "add a test"));
    }

    #[test]
    fn cli_parses_doctor_subcommand() {
        let cli = Cli::parse_from(["depforge", "doctor"]);
        assert!(matches!(cli.cmd, Commands::Doctor));
    }
}
