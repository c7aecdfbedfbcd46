//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use askpage_core::{AskService, ProgressReporter};
use askpage_fetch::UrlValidator;
use askpage_shared::{
    AnswerResult, AppConfig, FetchRequest, init_config, load_config, load_config_from,
    validate_config,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, bail, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::server;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// askpage: ask questions about allow-listed web pages.
#[derive(Parser)]
#[command(
    name = "askpage",
    version,
    about = "Fetch an allow-listed web page and answer a question about it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.askpage/askpage.toml).
    #[arg(long, global = true, env = "ASKPAGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ask a question about a web page.
    Ask {
        /// Page URL (must be on the allow-list).
        url: String,

        /// Question to answer from the page content.
        question: String,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the HTTP API server.
    Serve {
        /// Bind address (defaults to the configured host).
        #[arg(long)]
        host: Option<String>,

        /// Port (defaults to the configured port).
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },

    /// List the allow-listed domains.
    Domains,

    /// Check whether a URL passes validation.
    Check {
        /// URL to check.
        url: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "askpage=info,tower_http=info",
        1 => "askpage=debug,tower_http=debug",
        _ => "askpage=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Ask {
            url,
            question,
            json,
        } => cmd_ask(config_path, &url, &question, json).await,
        Command::Serve { host, port } => cmd_serve(config_path, host, port).await,
        Command::Domains => cmd_domains(config_path),
        Command::Check { url } => cmd_check(config_path, &url),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// Load from `--config` if given, else the default location.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(config_path: Option<&Path>, url: &str, question: &str, json: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let service = AskService::new(config)?;
    let request = FetchRequest::new(url, question, &service.config().policy)?;

    info!(url, "asking");

    let reporter = CliProgress::new();
    let result = service.ask_request(request, &reporter).await;
    reporter.finish();
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_answer(&result);
    }

    Ok(())
}

fn print_answer(result: &AnswerResult) {
    let meta = &result.metadata;

    println!();
    println!("{}", result.answer);
    println!();
    if let Some(contact) = &result.contact_info {
        for email in &contact.emails {
            println!("  Email:  {email}");
        }
        for phone in &contact.phones {
            println!("  Phone:  {phone}");
        }
    }
    println!("  Source:  {} (answer), {} (fetch)", meta.answer_source.as_str(), meta.fetch_source.as_str());
    println!("  Content: {} chars", meta.content_length);
    println!("  Time:    {:.1}s", meta.processing_time_ms as f64 / 1000.0);
    println!();
}

async fn cmd_serve(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    validate_config(&config)?;

    let host = config.server.host.clone();
    let port = config.server.port;
    let service = Arc::new(AskService::new(config)?);

    info!(
        providers = ?service.composer().provider_names(),
        domains = service.validator().domains().len(),
        "starting server"
    );

    server::serve(service, &host, port).await
}

fn cmd_domains(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    for domain in config.policy.domains() {
        println!("{domain}");
    }
    Ok(())
}

fn cmd_check(config_path: Option<&Path>, url: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let validator = UrlValidator::new(&config.policy);

    if validator.validate(url) {
        println!("allowed: {url}");
        Ok(())
    } else {
        bail!("not permitted: {url}")
    }
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => {
            let content = toml::to_string_pretty(&AppConfig::default())?;
            std::fs::write(path, content)
                .map_err(|e| eyre!("failed to write {}: {e}", path.display()))?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }
}
