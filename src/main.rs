use clap::{Args, Parser, Subcommand};
use rtc_gpu_media::config::{LoadTestConfig, ServerConfig, Termination};
use rtc_gpu_media::report::{ComparisonReporter, RunReport, WorkloadSweep};
use rtc_gpu_media::{DeviceMode, LoadTestRun, Server, TargetClient, WorkloadDescriptor};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Simulated GPU media processing service and closed-loop latency benchmark
#[derive(Parser)]
#[command(name = "rtc-gpu-media", version, about)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the processing service
    Serve(ServeArgs),
    /// Run a load test (or a cpu/gpu comparison) against a running service
    Load(LoadArgs),
    /// Validate a configuration file without starting the service
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long, default_value = "server.hcl")]
        config: String,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Path to configuration file (.hcl)
    #[arg(short, long, default_value = "server.hcl")]
    config: String,

    /// Override listen address (e.g., 0.0.0.0:8080)
    #[arg(short, long)]
    listen: Option<String>,

    /// Override the initial device mode (gpu or cpu)
    #[arg(long, env = "RTC_DEVICE_MODE")]
    device: Option<String>,
}

#[derive(Args)]
struct LoadArgs {
    /// Base URL of the service under test
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// Total number of requests
    #[arg(long, default_value_t = 50)]
    requests: u64,

    /// Run for this many seconds instead of a fixed request count
    #[arg(long, conflicts_with = "requests")]
    duration_secs: Option<u64>,

    /// Number of concurrent workers
    #[arg(long, default_value_t = 10)]
    concurrency: usize,

    /// Frame size as WxH
    #[arg(long, default_value = "1280x720")]
    pixels: String,

    /// Processing iterations per request
    #[arg(long, default_value_t = 5)]
    iterations: u32,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// Run the cpu profile, then the gpu profile, and report the speedup
    #[arg(long)]
    comparison: bool,

    /// Run small, medium and large workloads in turn and report server latency for each
    #[arg(long, conflicts_with = "comparison")]
    sweep: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> rtc_gpu_media::Result<()> {
    let cli = Cli::parse();

    if let Commands::Validate { config: config_path } = &cli.command {
        return validate_config(config_path).await;
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Load(args) => load(args).await,
        Commands::Validate { .. } => Ok(()),
    }
}

async fn serve(args: ServeArgs) -> rtc_gpu_media::Result<()> {
    tracing::info!("rtc-gpu-media v{}", env!("CARGO_PKG_VERSION"));

    let mut config = if std::path::Path::new(&args.config).exists() {
        tracing::info!(config = args.config, "Loading configuration");
        ServerConfig::from_file(&args.config).await?
    } else {
        tracing::warn!("Config file not found, using defaults");
        ServerConfig::default()
    };

    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(device) = &args.device {
        config.device.mode = DeviceMode::from_str(device)?;
    }

    let server = Server::new(config)?;
    server.start().await?;

    tracing::info!("Server ready, press Ctrl+C to stop");

    server.wait_for_shutdown().await;

    Ok(())
}

async fn load(args: LoadArgs) -> rtc_gpu_media::Result<()> {
    let termination = match args.duration_secs {
        Some(secs) => Termination::Duration(Duration::from_secs(secs)),
        None => Termination::Requests(args.requests),
    };
    let config = LoadTestConfig {
        target: args.url.clone(),
        concurrency: args.concurrency,
        termination,
        workload: WorkloadDescriptor::parse(&args.pixels, args.iterations)?,
        timeout: Duration::from_millis(args.timeout_ms),
        ..Default::default()
    };
    config.validate()?;

    let client = TargetClient::new(config.base_url(), config.timeout)?;

    if args.sweep {
        let report = WorkloadSweep::standard(config).run(Arc::new(client)).await?;
        if args.json {
            println!("{}", report.to_json()?);
        } else {
            print!("{}", report);
        }
        return Ok(());
    }

    if args.comparison {
        let report = ComparisonReporter::new(config)
            .run(Arc::new(client.clone()), &client)
            .await?;
        if args.json {
            println!("{}", report.to_json()?);
        } else {
            for leg in &report.legs {
                println!("[{}]", leg.profile);
                println!("{}", leg.report);
            }
            print!("{}", report);
        }
        return Ok(());
    }

    let run = LoadTestRun::new(config).execute(Arc::new(client)).await?;
    let report = RunReport::from_run(&run);
    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report);
    }

    Ok(())
}

/// Validate a configuration file and print diagnostics
async fn validate_config(path: &str) -> rtc_gpu_media::Result<()> {
    use std::path::Path;

    let config_path = Path::new(path);
    if !config_path.exists() {
        eprintln!("✗ Config file not found: {}", path);
        std::process::exit(1);
    }

    // Parse
    let config = match ServerConfig::from_file(path).await {
        Ok(c) => {
            println!("✓ Config parsed successfully ({})", path);
            c
        }
        Err(e) => {
            eprintln!("✗ Parse error: {}", e);
            std::process::exit(1);
        }
    };

    // Validate
    if let Err(e) = config.validate() {
        eprintln!("✗ Validation error: {}", e);
        std::process::exit(1);
    }

    let sim = &config.simulator;
    println!("✓ Configuration is valid");
    println!();
    println!("  Listen:      {}", config.listen);
    println!(
        "  Device:      {} (speedup {}x)",
        config.device.mode, config.device.speedup_factor
    );
    println!(
        "  Latency:     {} ms + {} ms per megapixel-iteration (±{}%)",
        sim.base_latency_ms,
        sim.ms_per_megapixel_iteration,
        sim.jitter_ratio * 100.0
    );
    println!(
        "  Limits:      {}x{}, {} iterations",
        sim.max_width, sim.max_height, sim.max_iterations
    );
    if sim.failure_rate > 0.0 {
        println!("  Failures:    {}% injected", sim.failure_rate * 100.0);
    }
    if config.gauge.capacity == 0 {
        println!("  p95 gauge:   disabled");
    } else {
        println!("  p95 gauge:   last {} requests", config.gauge.capacity);
    }

    Ok(())
}
