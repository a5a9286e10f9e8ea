use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use keycheck::{
    key::{
        engine::engine_version,
        export::DEFAULT_PROFILE_TITLE,
        fetch::{load_source_urls, SOURCES_ENV_VAR, SOURCES_FILE},
        probes, rank,
    },
    locate_engine, tui::KeyCheckerApp, ExportConfig, Exporter, FeedParser, KeyChecker,
    SubscriptionFetcher, Verdict, VerifierConfig,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// A VPN subscription key parser and checker with multi-threading support
#[derive(Parser)]
#[command(name = "keycheck")]
#[command(about = "A VPN subscription key parser and checker with multi-threading support")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone)]
struct CheckArgs {
    /// Subscription URLs to fetch keys from (can specify multiple)
    #[arg(short, long)]
    url: Vec<String>,
    /// File containing subscription URLs (one URL per line)
    #[arg(short = 'f', long)]
    url_file: Option<PathBuf>,
    /// Input file containing keys to check instead of fetching
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Number of concurrent checks
    #[arg(short = 'n', long, default_value = "50")]
    concurrency: usize,
    /// TCP probe timeout in seconds
    #[arg(long, default_value = "5")]
    tcp_timeout: u64,
    /// Highest acceptable TCP latency in milliseconds
    #[arg(long, default_value = "3000")]
    max_latency: u64,
    /// Path to the sing-box binary
    #[arg(long)]
    engine: Option<PathBuf>,
    /// Path to a MaxMind country database for offline lookups
    #[arg(long)]
    mmdb: Option<String>,
    /// Validate TLS certificates instead of accepting any
    #[arg(long)]
    verify_tls: bool,
    /// Output directory for result files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,
    /// Subscription profile title
    #[arg(long, default_value = "VPN Keys")]
    title: String,
}

impl Default for CheckArgs {
    fn default() -> Self {
        Self {
            url: Vec::new(),
            url_file: None,
            input: None,
            concurrency: 50,
            tcp_timeout: 5,
            max_latency: 3000,
            engine: None,
            mmdb: None,
            verify_tls: false,
            output: PathBuf::from("."),
            title: DEFAULT_PROFILE_TITLE.to_string(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check keys and export the working ones
    Check(CheckArgs),
    /// Fetch subscription feeds and print or save the keys
    Fetch {
        /// Subscription URLs to fetch keys from (can specify multiple)
        #[arg(short, long)]
        url: Vec<String>,
        /// File containing subscription URLs (one URL per line)
        #[arg(short = 'f', long)]
        url_file: Option<PathBuf>,
        /// Output file for fetched keys
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse keys out of a local feed file
    Parse {
        /// Input file containing a subscription feed
        input: PathBuf,
        /// Output file for parsed keys
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check keys with the interactive TUI
    Tui(CheckArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The TUI owns the terminal; log lines would draw over it
    if !matches!(cli.command, Some(Commands::Tui(_))) {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    match cli.command {
        Some(Commands::Check(args)) => run_check(args, false).await,
        Some(Commands::Tui(args)) => run_check(args, true).await,
        None => run_check(CheckArgs::default(), false).await,
        Some(Commands::Fetch {
            url,
            url_file,
            output,
        }) => {
            let sources = load_source_urls(&url, url_file.as_deref())?;
            if sources.is_empty() {
                return Err(anyhow!(
                    "no subscription sources given, pass --url or --url-file"
                ));
            }
            let keys = collect_keys(&sources).await?;
            output_keys(&keys, output.as_deref())
        }
        Some(Commands::Parse { input, output }) => {
            let keys = FeedParser::parse_file(&input)?;
            println!("Parsed {} keys from {:?}", keys.len(), input);
            output_keys(&keys, output.as_deref())
        }
    }
}

async fn run_check(args: CheckArgs, tui: bool) -> Result<()> {
    let engine = locate_engine(args.engine.as_deref())
        .map_err(|e| anyhow!("{} (install sing-box or pass --engine)", e))?;
    match engine_version(&engine).await {
        Some(version) => println!("Engine: {} ({})", engine.display(), version),
        None => println!("Engine: {}", engine.display()),
    }

    let keys = match &args.input {
        Some(input) => {
            let keys = FeedParser::parse_file(input)?;
            println!("Loaded {} keys from {:?}", keys.len(), input);
            keys
        }
        None => {
            let sources = load_source_urls(&args.url, args.url_file.as_deref())?;
            if sources.is_empty() {
                return Err(anyhow!(
                    "no key sources given, pass --url/--url-file/--input, set {} or create {}",
                    SOURCES_ENV_VAR,
                    SOURCES_FILE
                ));
            }
            println!("Fetching {} sources...", sources.len());
            collect_keys(&sources).await?
        }
    };
    if keys.is_empty() {
        return Err(anyhow!("no keys to check"));
    }

    let own_ip = probes::own_ip().await;
    if own_ip.is_empty() {
        println!("Own IP: unknown (continuing; any echoed IP counts as changed)");
    } else {
        println!("Own IP: {}", own_ip);
    }

    let mut config = VerifierConfig::new()
        .with_concurrency(args.concurrency)
        .with_tcp_timeout(Duration::from_secs(args.tcp_timeout))
        .with_max_latency_ms(args.max_latency)
        .with_engine_binary(engine)
        .with_own_ip(own_ip)
        .with_verify_tls(args.verify_tls);
    if let Some(mmdb) = &args.mmdb {
        config = config.with_mmdb_path(mmdb.clone());
    }

    if tui {
        std::fs::create_dir_all(&args.output)?;
        let mut app = KeyCheckerApp::new(keys, config, Some(args.output.join("keys.txt")));
        return app.run().await;
    }

    println!(
        "Checking {} keys with {} workers...",
        keys.len(),
        args.concurrency
    );
    println!();

    let checker = KeyChecker::with_config(config);
    let total = keys.len();
    let verdicts = checker.check_keys(keys).await;

    print_summary(&verdicts);

    let mut working: Vec<Verdict> = verdicts
        .into_iter()
        .filter(|verdict| verdict.is_working())
        .collect();
    rank::sort_for_display(&mut working);

    let exporter = Exporter::with_config(
        ExportConfig::new()
            .with_out_dir(args.output.clone())
            .with_profile_title(args.title),
    );
    exporter.write_all(&working, total)?;
    println!("Saved {} working keys to {:?}", working.len(), args.output);

    Ok(())
}

fn print_summary(verdicts: &[Verdict]) {
    let tcp = verdicts.iter().filter(|v| v.tcp_reachable).count();
    let proxy = verdicts.iter().filter(|v| v.proxy_usable).count();
    let ip = verdicts.iter().filter(|v| v.ip_changed).count();
    let download = verdicts.iter().filter(|v| v.download_ok).count();
    let working = verdicts.iter().filter(|v| v.working).count();

    println!("Checked:       {}", verdicts.len());
    println!("TCP reachable: {}", tcp);
    println!("Proxy usable:  {}", proxy);
    println!("IP changed:    {}", ip);
    println!("Download OK:   {}", download);
    println!("Working:       {}", working);

    let mut best: Vec<Verdict> = verdicts
        .iter()
        .filter(|verdict| verdict.working)
        .cloned()
        .collect();
    if !best.is_empty() {
        rank::sort_by_quality(&mut best);
        println!("\nTop keys:");
        for verdict in best.iter().take(5) {
            let slow = verdict.download_ok && verdict.speed_kbps < probes::MIN_SPEED_KBPS;
            println!(
                "  {} {} | {} ({}ms, {:.0} KB/s){}",
                rank::country_flag(&verdict.country_code),
                verdict.country,
                verdict.isp,
                verdict.latency_ms,
                verdict.speed_kbps,
                if slow { " (slow)" } else { "" }
            );
        }
    }
}

async fn collect_keys(sources: &[String]) -> Result<Vec<String>> {
    let fetcher = SubscriptionFetcher::new()?;
    let results = fetcher.fetch_urls_with_results(sources).await;

    let mut all_keys = Vec::new();
    for result in results {
        if result.is_success() {
            println!("Found {} keys from {}", result.keys.len(), result.source);
            all_keys.extend(result.keys);
        } else if let Some(error) = result.error {
            eprintln!("Error fetching {}: {}", result.source, error);
        }
    }

    let mut seen = HashSet::new();
    all_keys.retain(|key| seen.insert(key.clone()));
    Ok(all_keys)
}

fn output_keys(keys: &[String], output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        FeedParser::save_to_file(keys, path)?;
        println!("Saved {} keys to {:?}", keys.len(), path);
    } else {
        for key in keys {
            println!("{}", key);
        }
    }
    Ok(())
}
