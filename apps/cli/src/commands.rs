//! CLI command definitions, routing, and tracing setup.

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use siteqa_artifacts::ArtifactWriter;
use siteqa_core::{
    ProgressReporter, ScrapeSummary, Scraper, TeardownReport, UploadSessionReport, Uploader,
    teardown_session,
};
use siteqa_crawler::Crawler;
use siteqa_discovery::DiscoveryOptions;
use siteqa_docstore::OpenAiClient;
use siteqa_shared::{
    AppConfig, CrawlConfig, UploadConfig, expand_home, init_config, load_config,
};
use siteqa_storage::SessionStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteQA: turn a documentation site into a searchable vector store.
#[derive(Parser)]
#[command(
    name = "siteqa",
    version,
    about = "Scrape documentation sites into Markdown and sync them to a vector store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory holding session records (overrides the config file).
    #[arg(long, global = true, env = "SITEQA_SESSION_DIR")]
    pub session_dir: Option<String>,

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
    /// Crawl a site's sitemap and write one Markdown artifact per page.
    Scrape {
        /// Base URL of the site; `<url>/sitemap.xml` is read.
        url: String,

        #[command(flatten)]
        session: SessionArg,

        /// Pages fetched concurrently per batch.
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Output directory for artifacts.
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Upload the session's artifacts and attach them to its vector store.
    Upload {
        #[command(flatten)]
        session: SessionArg,
    },

    /// Scrape, then upload.
    Run {
        /// Base URL of the site.
        url: String,

        #[command(flatten)]
        session: SessionArg,

        /// Pages fetched concurrently per batch.
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Output directory for artifacts.
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Delete the session's vector store, files, threads and record.
    Teardown {
        #[command(flatten)]
        session: SessionArg,
    },

    /// Inspect session records.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct SessionArg {
    /// Session name correlating a scrape with its upload target.
    #[arg(short, long)]
    pub session: String,
}

/// Session subcommands.
#[derive(Subcommand)]
pub(crate) enum SessionAction {
    /// Print the stored record.
    Show {
        #[command(flatten)]
        session: SessionArg,
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
        0 => "siteqa=info",
        1 => "siteqa=debug",
        _ => "siteqa=trace",
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
    let session_dir = cli.session_dir;
    match cli.command {
        Command::Scrape {
            url,
            session,
            batch_size,
            out,
        } => {
            let config = load_config()?;
            let sessions = open_sessions(&config, session_dir.as_deref()).await?;
            cmd_scrape(&config, sessions, &url, &session.session, batch_size, out.as_deref())
                .await
                .map(|_| ())
        }
        Command::Upload { session } => {
            let config = load_config()?;
            let sessions = open_sessions(&config, session_dir.as_deref()).await?;
            cmd_upload(&config, sessions, &session.session).await
        }
        Command::Run {
            url,
            session,
            batch_size,
            out,
        } => {
            let config = load_config()?;
            let sessions = open_sessions(&config, session_dir.as_deref()).await?;
            let summary = cmd_scrape(
                &config,
                sessions.clone(),
                &url,
                &session.session,
                batch_size,
                out.as_deref(),
            )
            .await?;
            if summary.artifacts.is_empty() {
                println!("  Nothing scraped, skipping upload.");
                return Ok(());
            }
            cmd_upload(&config, sessions, &session.session).await
        }
        Command::Teardown { session } => {
            let config = load_config()?;
            let sessions = open_sessions(&config, session_dir.as_deref()).await?;
            cmd_teardown(&config, &sessions, &session.session).await
        }
        Command::Session { action } => match action {
            SessionAction::Show { session } => {
                let config = load_config()?;
                let sessions = open_sessions(&config, session_dir.as_deref()).await?;
                cmd_session_show(&sessions, &session.session).await
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

async fn open_sessions(config: &AppConfig, override_dir: Option<&str>) -> Result<SessionStore> {
    let dir = expand_home(override_dir.unwrap_or(&config.defaults.session_dir));
    Ok(SessionStore::open(dir).await?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_scrape(
    config: &AppConfig,
    sessions: SessionStore,
    url: &str,
    session: &str,
    batch_size: Option<usize>,
    out: Option<&str>,
) -> Result<ScrapeSummary> {
    let base_url = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    let mut crawl_config = CrawlConfig::from(config);
    if let Some(size) = batch_size {
        crawl_config.batch_size = size;
    }
    let output_dir = expand_home(out.unwrap_or(&config.defaults.output_dir));

    info!(url, session, batch_size = crawl_config.batch_size, "scraping site");

    let scraper = Scraper::new(
        Crawler::http(crawl_config)?,
        ArtifactWriter::new(&output_dir),
        sessions,
        DiscoveryOptions::from(config),
    );

    let reporter = CliProgress::new();
    let summary = scraper.scrape(&base_url, session, &reporter).await?;
    reporter.finish();

    println!();
    if summary.discovered == 0 {
        println!("  No URLs found in {}", siteqa_discovery::sitemap_url(&base_url));
    } else {
        println!("  Scrape finished.");
        println!("  Session:   {session}");
        println!("  URLs:      {}", summary.discovered);
        println!("  Artifacts: {}", summary.artifacts.len());
        println!(
            "  Failed:    {}",
            summary.fetch_failures + summary.write_failures
        );
        println!("  Output:    {}", output_dir.display());
    }
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(summary)
}

async fn cmd_upload(config: &AppConfig, sessions: SessionStore, session: &str) -> Result<()> {
    let client = OpenAiClient::from_config(config)?;
    let uploader = Uploader::new(Arc::new(client), sessions, UploadConfig::from(config));

    info!(session, "uploading session artifacts");

    let reporter = CliProgress::new();
    let result = uploader.upload_session(session, &reporter).await;
    reporter.finish();
    let report = result?;

    print_upload_report(session, &report);
    Ok(())
}

fn print_upload_report(session: &str, report: &UploadSessionReport) {
    println!();
    if report.is_noop() {
        println!("  Nothing to upload for session '{session}'.");
        println!();
        return;
    }

    println!("  Upload finished.");
    println!("  Session:      {session}");
    println!("  Thread:       {}", report.thread_id);
    if let Some(store_id) = &report.vector_store_id {
        println!("  Vector store: {store_id}");
    }
    println!("  Uploaded:     {}", report.uploaded());
    println!("  Attached:     {}", report.attached);
    for failed in report.failed() {
        let reason = failed.result.as_ref().err().map(String::as_str).unwrap_or("");
        println!("  Failed:       {} ({reason})", failed.file_name);
    }
    println!("  Time:         {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

async fn cmd_teardown(config: &AppConfig, sessions: &SessionStore, session: &str) -> Result<()> {
    let client = OpenAiClient::from_config(config)?;

    info!(session, "tearing down session");
    let report = teardown_session(Arc::new(client), sessions, session).await?;

    print_teardown_report(session, &report);
    if report.is_clean() {
        Ok(())
    } else {
        Err(eyre!(
            "teardown of '{session}' left {} resource(s) behind",
            report.failures.len()
        ))
    }
}

fn print_teardown_report(session: &str, report: &TeardownReport) {
    println!();
    if !report.record_found {
        println!("  No record for session '{session}', nothing to remove.");
        println!();
        return;
    }
    println!("  Teardown of '{session}':");
    if let Some(store_id) = &report.vector_store_id {
        let state = if report.vector_store_deleted { "deleted" } else { "kept" };
        println!("  Vector store: {store_id} ({state})");
    }
    println!("  Detached:     {}", report.store_files_detached);
    println!("  Files:        {}", report.files_deleted);
    println!("  Threads:      {}", report.threads_deleted);
    println!("  Already gone: {}", report.already_gone);
    for failure in &report.failures {
        println!("  Failed:       {failure}");
    }
    println!();
}

async fn cmd_session_show(sessions: &SessionStore, session: &str) -> Result<()> {
    if !sessions.exists(session).await? {
        return Err(eyre!(
            "no record for session '{session}' in {}",
            sessions.root().display()
        ));
    }
    let record = sessions.load(session).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
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
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
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

    fn batch_started(&self, index: usize, total: usize, size: usize) {
        self.spinner
            .set_message(format!("Crawling batch [{}/{total}] ({size} pages)", index + 1));
    }

    fn batch_finished(&self, index: usize, total: usize, succeeded: usize, failed: usize) {
        self.spinner.set_message(format!(
            "Batch [{}/{total}] done: {succeeded} ok, {failed} failed",
            index + 1
        ));
    }

    fn artifact_written(&self, path: &Path, current: usize, total: usize) {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        self.spinner
            .set_message(format!("Writing [{current}/{total}] {name}"));
    }

    fn file_uploaded(&self, name: &str, success: bool, current: usize, total: usize) {
        let mark = if success { "✓" } else { "✗" };
        self.spinner
            .set_message(format!("Uploading [{current}/{total}] {mark} {name}"));
    }
}
