use anyhow::Result;
use clap::{Parser, Subcommand};
use proxy_probe::{
    input::load_proxy_list,
    logging::init_logging,
    proxy::{resolve, CheckerConfig, ProxyChecker, ResultAggregator},
    report::{render_table, save_session, ReportFormat},
    tui::ProxyCheckerApp,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// A concurrent HTTP/SOCKS5 proxy health checker
#[derive(Parser)]
#[command(name = "proxy-probe")]
#[command(about = "A concurrent HTTP/SOCKS5 proxy health checker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxies and save results
    Check {
        /// Input file containing proxies, one per line
        input: PathBuf,
        /// Directory for working/failed lists and results
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// Format of the full results file
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Txt)]
        format: ReportFormat,
        /// Maximum number of proxies checked at once
        #[arg(short = 'n', long, default_value = "50", env = "PROXY_PROBE_MAX_CONCURRENT")]
        max_concurrent: usize,
        /// Timeout per attempt in seconds
        #[arg(long, default_value = "10", env = "PROXY_PROBE_TIMEOUT")]
        timeout: u64,
        /// Additional attempts after the first failure
        #[arg(short, long, default_value = "2", env = "PROXY_PROBE_RETRIES")]
        retries: u32,
        /// Pause between attempts in milliseconds
        #[arg(long, default_value = "1000", env = "PROXY_PROBE_RETRY_DELAY_MS")]
        retry_delay_ms: u64,
        /// JSON endpoint reporting the caller's IP and country
        #[arg(long, default_value = "http://ip-api.com/json", env = "PROXY_PROBE_TEST_URL")]
        test_url: String,
        /// User-Agent header sent with each probe request
        #[arg(long, env = "PROXY_PROBE_USER_AGENT")]
        user_agent: Option<String>,
        /// MaxMind database used when the endpoint reports no country
        #[arg(long, env = "PROXY_PROBE_MMDB")]
        mmdb: Option<PathBuf>,
        /// Show the live dashboard
        #[arg(long)]
        tui: bool,
        /// Do not print the results table
        #[arg(long)]
        no_table: bool,
    },
    /// Show how each proxy in a file is interpreted
    Resolve {
        /// Input file containing proxies, one per line
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let tui = matches!(cli.command, Commands::Check { tui: true, .. });
    init_logging(cli.verbose, tui);

    match cli.command {
        Commands::Check {
            input,
            output_dir,
            format,
            max_concurrent,
            timeout,
            retries,
            retry_delay_ms,
            test_url,
            user_agent,
            mmdb,
            tui,
            no_table,
        } => {
            let mut config = CheckerConfig::new()
                .with_concurrency(max_concurrent)
                .with_timeout(Duration::from_secs(timeout))
                .with_retries(retries)
                .with_retry_delay(Duration::from_millis(retry_delay_ms))
                .with_test_url(test_url);
            if let Some(user_agent) = user_agent {
                config = config.with_user_agent(user_agent);
            }
            if let Some(path) = mmdb {
                config = config.with_mmdb_path(path);
            }
            config.validate()?;

            let proxies = load_proxy_list(&input)?;
            if proxies.is_empty() {
                println!("No proxies found in {:?}", input);
                return Ok(());
            }

            let checker = ProxyChecker::with_config(config);
            let aggregator = ResultAggregator::new();

            if tui {
                let mut app = ProxyCheckerApp::new(checker, proxies, aggregator.clone());
                app.run().await?;
                if !app.is_complete() {
                    println!("Check interrupted, saving partial results.");
                }
            } else {
                let config = checker.config();
                println!("Loaded {} proxies from {:?}", proxies.len(), input);
                println!(
                    "Checking with {} concurrent, timeout: {}s, retries: {}",
                    config.max_concurrent,
                    config.timeout.as_secs(),
                    config.retries
                );
                println!("Test URL: {}", config.test_url);
                println!();

                checker
                    .run_all(proxies, &aggregator, |update| {
                        eprint!("\rChecked {}/{}", update.completed, update.total);
                        let _ = std::io::stderr().flush();
                    })
                    .await;
                eprintln!();
            }

            let session = aggregator.snapshot();
            if !no_table {
                println!("\nProxy Checking Results:");
                print!("{}", render_table(&session.sorted_by_latency()));
            }

            println!(
                "\nResults: {} working, {} failed",
                session.working.len(),
                session.failed.len()
            );
            for path in save_session(&session, &output_dir, format)? {
                println!("Saved {:?}", path);
            }
        }
        Commands::Resolve { input } => {
            for raw in load_proxy_list(&input)? {
                match resolve(&raw) {
                    Ok(descriptor) => println!("{raw} -> {descriptor}"),
                    Err(e) => println!("{raw} -> {e}"),
                }
            }
        }
    }

    Ok(())
}
