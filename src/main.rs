use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, CommandFactory, Parser};
use explain_agent::council::Council;
use explain_agent::github::{GitHubClient, RepoApi};
use explain_agent::llm::{self, endpoint_root, ChatModel, LlmClient};
use explain_agent::pipeline::{self, Mode, Target};
use explain_agent::prompt;
use explain_core::{Depth, DepthProfile, ExplainConfig, OutputFormat, RepositoryRef};
use explain_signal::LocalTree;
use miette::{IntoDiagnostic, Result};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = ".explain.toml";

#[derive(Parser)]
#[command(
    name = "explainthisrepo",
    version,
    about = "Explain GitHub repositories in plain English",
    long_about = "Explain GitHub repositories in plain English.\n\n\
                   Reads a repository's metadata, README, file tree and key files, then asks\n\
                   an LLM for an explanation. A local directory can be explained too.\n\n\
                   Examples:\n  \
                     explainthisrepo rust-lang/cargo              Write EXPLAIN.md\n  \
                     explainthisrepo https://github.com/a/b --quick  One sentence\n  \
                     explainthisrepo . --simple                   Bullet summary of this directory\n  \
                     explainthisrepo owner/repo --stack           Detect the tech stack\n  \
                     explainthisrepo owner/repo --council         Security, performance and style audit\n  \
                     explainthisrepo owner/repo --agent --interactive  Tool-using analysis, then Q&A\n  \
                     explainthisrepo --doctor                     Check setup and environment",
    group(ArgGroup::new("mode").args(["quick", "simple", "detailed", "stack", "council", "agent"]))
)]
struct Cli {
    /// Repository: owner/repo, a GitHub URL, or a local directory
    repository: Option<String>,

    /// One-sentence definition
    #[arg(long)]
    quick: bool,

    /// Short bullet-point summary
    #[arg(long)]
    simple: bool,

    /// Report with architecture, folder structure and file roles
    #[arg(long)]
    detailed: bool,

    /// Detect languages, frameworks and tooling without calling the LLM
    #[arg(long)]
    stack: bool,

    /// Audit with three reviewers: security, performance and style
    #[arg(long)]
    council: bool,

    /// Tool-using analysis sized by --depth
    #[arg(long)]
    agent: bool,

    /// Analysis depth for --agent and --council (quick, standard, deep)
    #[arg(long)]
    depth: Option<Depth>,

    /// Keep answering questions after the --agent report
    #[arg(long, requires = "agent")]
    interactive: bool,

    /// Report file (default: EXPLAIN.md)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        default_value = "text",
        long_help = "Output format.\n\n\
                       Formats:\n  \
                         text      Human-readable output; reports go to the output file (default)\n  \
                         json      Machine-readable JSON on stdout\n  \
                         markdown  Same as text"
    )]
    format: OutputFormat,

    /// Path to configuration file (default: .explain.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,

    /// Check your setup and environment
    #[arg(long, exclusive = true)]
    doctor: bool,

    /// Create a default .explain.toml
    #[arg(long, exclusive = true)]
    init: bool,

    /// Generate shell completion scripts
    #[arg(long, hide = true, value_enum, exclusive = true)]
    completions: Option<clap_complete::Shell>,
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.quick {
            Mode::Quick
        } else if self.simple {
            Mode::Simple
        } else if self.detailed {
            Mode::Detailed
        } else {
            Mode::Standard
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<ExplainConfig> {
    let mut config = match path {
        Some(path) => ExplainConfig::from_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                ExplainConfig::from_file(default_path)?
            } else {
                ExplainConfig::default()
            }
        }
    };
    config.apply_env();
    Ok(config)
}

/// Progress reporting: a spinner on a terminal, plain lines otherwise.
struct Progress(Option<indicatif::ProgressBar>);

impl Progress {
    fn start() -> Self {
        if !std::io::stderr().is_terminal() {
            return Self(None);
        }
        let pb = indicatif::ProgressBar::new_spinner();
        if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        Self(Some(pb))
    }

    fn step(&self, message: impl Into<String>) {
        let message = message.into();
        match &self.0 {
            Some(pb) => pb.set_message(message),
            None => eprintln!("{message}"),
        }
    }

    fn finish(self) {
        if let Some(pb) = self.0 {
            pb.finish_and_clear();
        }
    }
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self, use_color: bool) -> &'static str {
        match (self.status, use_color) {
            ("pass", true) => "\x1b[32m\u{2713}\x1b[0m",
            ("pass", false) => "\u{2713}",
            ("fail", true) => "\x1b[31m\u{2717}\x1b[0m",
            ("fail", false) => "\u{2717}",
            (_, true) => "\x1b[33m~\x1b[0m",
            (_, false) => "~",
        }
    }
}

/// Any HTTP response counts as reachable; only transport errors fail.
async fn check_reachable(
    client: &reqwest::Client,
    name: &'static str,
    url: &str,
) -> CheckResult {
    match client.get(url).send().await {
        Ok(response) => CheckResult::pass(name, format!("{url} reachable (HTTP {})", response.status().as_u16())),
        Err(e) => CheckResult::fail(
            name,
            format!("{url} unreachable: {e}"),
            "check your network connection, proxy settings or base URL",
        ),
    }
}

/// Print diagnostics; returns `false` if a network check failed.
async fn run_doctor(config: &ExplainConfig, config_path: Option<&Path>, format: OutputFormat) -> Result<bool> {
    let mut checks: Vec<CheckResult> = Vec::new();

    checks.push(CheckResult::info(
        "platform",
        format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
    ));

    let path = config_path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    if path.exists() {
        checks.push(CheckResult::pass("config_file", format!("{} found", path.display())));
    } else {
        checks.push(CheckResult::info(
            "config_file",
            format!("{} not found, using defaults (run 'explainthisrepo --init')", path.display()),
        ));
    }

    checks.push(CheckResult::pass(
        "llm_provider",
        format!("{} (model: {})", config.llm.provider, config.llm.model),
    ));
    let key_vars = config.llm.api_key_env_vars().join(" or ");
    if config.llm.api_key.is_some() {
        checks.push(CheckResult::pass("llm_api_key", "API key configured"));
    } else {
        checks.push(CheckResult::fail(
            "llm_api_key",
            format!("{key_vars} not set"),
            format!(
                "export {}=... or set api_key in {DEFAULT_CONFIG_FILE}",
                config.llm.api_key_env_vars().first().copied().unwrap_or("GEMINI_API_KEY")
            ),
        ));
    }

    if config.github.token.is_some() {
        checks.push(CheckResult::pass("github_token", "token configured"));
    } else {
        checks.push(CheckResult::info(
            "github_token",
            "GITHUB_TOKEN not set (unauthenticated requests have a low rate limit)",
        ));
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(8))
        .user_agent(concat!("explainthisrepo/", env!("CARGO_PKG_VERSION")))
        .build()
        .into_diagnostic()?;
    let github = check_reachable(&client, "github_network", &config.github.api_base_url).await;
    let llm = check_reachable(&client, "llm_network", &endpoint_root(&config.llm)).await;
    let network_ok = github.status != "fail" && llm.status != "fail";
    checks.push(github);
    checks.push(llm);

    let version = env!("CARGO_PKG_VERSION");
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let use_color = std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err();
            println!("explainthisrepo v{version} environment check\n");
            for check in &checks {
                let label = check.name.replace('_', " ");
                println!("  {} {label:<16} {}", check.symbol(use_color), check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }
            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(network_ok)
}

const DEFAULT_CONFIG: &str = r#"# explainthisrepo configuration
# Explicit CLI flags override environment variables, which override this file.

[llm]
# provider = "gemini"            # "gemini" or "openai"
# model = "gemini-2.5-flash-lite"
# api_key = "..."                # prefer GEMINI_API_KEY / OPENAI_API_KEY
# base_url = "https://generativelanguage.googleapis.com"
# max_retries = 2
# timeout_secs = 120

[github]
# token = "..."                  # prefer GITHUB_TOKEN / GH_TOKEN
# api_base_url = "https://api.github.com"
# raw_base_url = "https://raw.githubusercontent.com"
# fallback_branch = "master"
# remote_max_depth = 3

[output]
# file = "EXPLAIN.md"

[agent]
# depth = "standard"             # "quick", "standard" or "deep"
"#;

fn write_report(path: &Path, text: &str) -> Result<()> {
    println!("Writing {}...", path.display());
    pipeline::write_output(path, text)?;
    println!("{} generated successfully", path.display());
    println!("Words: {}", pipeline::word_count(text));
    Ok(())
}

/// Follow-up questions until EOF, `exit` or Ctrl-C.
async fn interactive_session(agent: &mut explain_agent::agent::AnalysisAgent) -> Result<()> {
    println!("\nAsk follow-up questions. Type 'exit' or press Ctrl-C to quit.");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush().into_diagnostic()?;

        let line = tokio::select! {
            line = lines.next_line() => line.into_diagnostic()?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        let progress = Progress::start();
        progress.step("Thinking...");
        let followup = prompt::build_followup_prompt(question);
        let answer = tokio::select! {
            answer = agent.run(&followup) => Some(answer),
            _ = tokio::signal::ctrl_c() => None,
        };
        progress.finish();
        match answer {
            Some(Ok(answer)) => println!("\n{answer}"),
            Some(Err(e)) => {
                agent.discard_unanswered();
                eprintln!("error: {e}");
            }
            None => {
                agent.discard_unanswered();
                break;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "explainthisrepo", &mut std::io::stdout());
        return Ok(());
    }

    if cli.init {
        let path = cli.config.as_deref().unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        if path.exists() {
            miette::bail!("{} already exists", path.display());
        }
        std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
        println!("Created {} with default configuration", path.display());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;

    if cli.doctor {
        if !run_doctor(&config, cli.config.as_deref(), cli.format).await? {
            std::process::exit(1);
        }
        return Ok(());
    }

    let Some(input) = cli.repository.as_deref() else {
        Cli::command().print_help().into_diagnostic()?;
        return Ok(());
    };

    let local = Path::new(input).is_dir();
    let local_tree = if local { Some(LocalTree::new(input)?) } else { None };
    let repo = match &local_tree {
        Some(_) => None,
        None => Some(explain_core::resolve(input)?),
    };
    tracing::info!(input, local, "resolved target");

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.file));
    let profile = DepthProfile::for_depth(cli.depth.unwrap_or(config.agent.depth));
    let cwd = std::env::current_dir().into_diagnostic()?;

    let api: Option<Arc<dyn RepoApi>> = match repo {
        Some(_) => Some(Arc::new(GitHubClient::new(&config.github)?)),
        None => None,
    };
    let target = match (&local_tree, &repo, &api) {
        (Some(tree), _, _) => Target::Local(tree),
        (None, Some(repo), Some(api)) => Target::Remote {
            repo,
            api: Arc::clone(api),
            max_depth: config.github.remote_max_depth,
        },
        _ => miette::bail!("no repository to analyze"),
    };

    if cli.stack {
        let progress = Progress::start();
        progress.step(format!("Detecting stack for {}...", target.display_name()));
        let report = pipeline::run_stack(&target).await;
        progress.finish();
        let report = report?;
        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?)
            }
            _ => println!("{}", report.render(&target.display_name())),
        }
        return Ok(());
    }

    let model: Arc<dyn ChatModel> = Arc::new(LlmClient::new(&config.llm)?);

    if cli.council || cli.agent {
        let (Some(repo), Some(api)) = (&repo, &api) else {
            miette::bail!(miette::miette!(
                help = "pass owner/repo or a GitHub URL",
                "--council and --agent need a GitHub repository, not a local path"
            ));
        };
        return run_multi_step(&cli, repo, Arc::clone(api), model, profile, &target, &output, &cwd).await;
    }

    let mode = cli.mode();
    let progress = Progress::start();
    progress.step(format!("Fetching {}...", target.display_name()));
    let text = match pipeline::build_explanation_prompt(mode, &target).await {
        Ok(prompt) => {
            progress.step("Generating explanation...");
            llm::generate_explanation(model.as_ref(), &prompt).await
        }
        Err(e) => Err(e),
    };
    progress.finish();
    let text = text?;

    match cli.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "repository": target.display_name(),
                "mode": mode.to_string(),
                "explanation": text,
                "words": pipeline::word_count(&text),
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ if mode.writes_file() => write_report(&output, &text)?,
        _ => println!("{text}"),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_multi_step(
    cli: &Cli,
    repo: &RepositoryRef,
    api: Arc<dyn RepoApi>,
    model: Arc<dyn ChatModel>,
    profile: &'static DepthProfile,
    target: &Target<'_>,
    output: &Path,
    cwd: &Path,
) -> Result<()> {
    let progress = Progress::start();
    progress.step(format!("Fetching {repo}..."));
    let signals = pipeline::gather_signals(target).await;

    if cli.council {
        progress.step(format!("Convening the council ({} depth)...", profile.depth));
        let report = Council::new(model, api, profile)
            .convene(repo, signals.as_ref(), cwd)
            .await;
        progress.finish();
        let report = report?;
        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?)
            }
            _ => write_report(output, &report.to_markdown())?,
        }
        return Ok(());
    }

    let mut agent = pipeline::open_agent_session(model, api, profile, repo, cwd)?;
    progress.step(format!("Analyzing {repo} ({} depth)...", profile.depth));
    let task = prompt::build_analysis_task(repo, signals.as_ref(), profile.context_budget.token_value);
    let report = tokio::select! {
        report = agent.run(&task) => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    progress.finish();

    let result = match report {
        Some(Ok(text)) => {
            let written = match cli.format {
                OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                    "repository": repo.to_string(),
                    "depth": profile.depth,
                    "report": text,
                }))
                .into_diagnostic()
                .map(|json| println!("{json}")),
                _ => write_report(output, &text),
            };
            match written {
                Ok(()) if cli.interactive => interactive_session(&mut agent).await,
                other => other,
            }
        }
        Some(Err(e)) => Err(e.into()),
        None => {
            agent.discard_unanswered();
            eprintln!("Interrupted");
            Ok(())
        }
    };

    agent.close()?;
    result
}
