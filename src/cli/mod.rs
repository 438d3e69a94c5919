//! Command-line interface.

mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use console::style;
use tracing::info;

use listharvest::config::{resolve_path, Config};
use listharvest::controller::{CrawlReport, CrawlRequest, RetryPolicy};
use listharvest::operator::{AutoConfirm, ConsoleOperator, OperatorSignal};
use listharvest::pacing::Pacer;
use listharvest::session::CrawlSession;
use listharvest::sink::{CsvSink, RecordSink};

use prompt::prompt_for_url;

#[derive(Parser, Debug)]
#[command(name = "listharvest")]
#[command(about = "Harvest classifieds listings into a CSV file")]
#[command(version)]
pub struct Cli {
    /// Category URL to crawl (prompted for when omitted)
    pub url: Option<String>,

    /// Page to start from (1-based)
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    pub start_page: u32,

    /// Highest page number to crawl (0 = all pages)
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Config file path (TOML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Proxy server for the browser
    #[arg(long, env = "LISTHARVEST_PROXY")]
    pub proxy: Option<String>,

    /// Attach to a running Chrome instead of launching one
    #[arg(long, env = "LISTHARVEST_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Directory for the CSV output
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Confirm operator checkpoints automatically
    #[arg(short, long)]
    pub yes: bool,

    /// Seed for pause and scroll jitter
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log file, in addition to the console
    #[arg(long, default_value = "listharvest.log")]
    pub log_file: PathBuf,

    /// Log to the console only
    #[arg(long)]
    pub no_log_file: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Log file to use, if any.
    pub fn log_path(&self) -> Option<PathBuf> {
        (!self.no_log_file).then(|| resolve_path(&self.log_file))
    }

    /// Apply command-line overrides on top of the loaded config.
    pub fn apply_overrides(&self, config: &mut Config) {
        if self.headless {
            config.browser.headless = true;
        }
        if let Some(proxy) = &self.proxy {
            config.browser.proxy = Some(proxy.clone());
        }
        if let Some(remote) = &self.remote_url {
            config.browser.remote_url = Some(remote.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.crawl.output_dir = resolve_path(dir);
        }
    }

    pub fn request(&self) -> CrawlRequest {
        CrawlRequest {
            start_page: self.start_page,
            max_pages: self.max_pages.filter(|&n| n > 0),
        }
    }

    fn pacer(&self, config: &Config) -> Pacer {
        match self.seed {
            Some(seed) => Pacer::seeded(config.pacing.clone(), seed),
            None => Pacer::new(config.pacing.clone()),
        }
    }

    fn operator(&self) -> Arc<dyn OperatorSignal> {
        if self.yes {
            Arc::new(AutoConfirm::new())
        } else {
            Arc::new(ConsoleOperator)
        }
    }
}

/// Run a crawl as described by `cli`.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())
        .await
        .context("failed to load configuration")?;
    cli.apply_overrides(&mut config);

    let target = match &cli.url {
        Some(url) => url.clone(),
        None => prompt_for_url(&config.site.default_url)?,
    };

    let session = CrawlSession::new(&target, &config)?;
    let sink = CsvSink::init(session.output_path())
        .with_context(|| format!("failed to create {}", session.output_path().display()))?;
    let output_path = sink.path().to_path_buf();
    info!("Writing listings to {}", output_path.display());

    let pacer = Arc::new(cli.pacer(&config));
    let request = cli.request();
    let policy = RetryPolicy::from_settings(&config.crawl);

    let outcome = harvest(
        session,
        config,
        Arc::new(sink),
        pacer,
        cli.operator(),
        &request,
        &policy,
    )
    .await;

    println!(
        "\n{} Scraped data has been saved to: {}",
        style("→").cyan(),
        style(output_path.display()).bold()
    );

    let report = outcome?;
    println!(
        "  {} {} records from {} pages ({} skipped, {} URL fallbacks, {} recoveries){}",
        style("✓").green(),
        report.records_written,
        report.pages_processed,
        report.listings_skipped,
        report.ui_fallbacks,
        report.recoveries,
        if report.halted {
            style(" - stopped early, navigation failed").yellow().to_string()
        } else {
            String::new()
        }
    );
    Ok(())
}

#[cfg(feature = "browser")]
async fn harvest(
    session: CrawlSession,
    config: Config,
    sink: Arc<dyn RecordSink>,
    pacer: Arc<Pacer>,
    operator: Arc<dyn OperatorSignal>,
    request: &CrawlRequest,
    policy: &RetryPolicy,
) -> anyhow::Result<CrawlReport> {
    use listharvest::browser::ChromiumLauncher;
    use listharvest::controller::Harvester;

    let harvester = Harvester::new(session, ChromiumLauncher, config, sink)
        .with_pacer(pacer)
        .with_operator(operator);
    Ok(harvester.run_with_retries(request, policy).await?)
}

#[cfg(not(feature = "browser"))]
async fn harvest(
    _session: CrawlSession,
    _config: Config,
    _sink: Arc<dyn RecordSink>,
    _pacer: Arc<Pacer>,
    _operator: Arc<dyn OperatorSignal>,
    _request: &CrawlRequest,
    _policy: &RetryPolicy,
) -> anyhow::Result<CrawlReport> {
    anyhow::bail!("listharvest was built without the `browser` feature; rebuild with --features browser")
}
