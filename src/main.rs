//! Lumen Session Agent CLI
//!
//! Timed light-stimulus pupillometry sessions with engagement scoring.

use clap::{Parser, Subcommand};
use lumen_agent::{
    config::AgentConfig,
    events::Event,
    server::{self, ServerConfig},
    session::{start_session, StartStatus},
    store::EngagementStore,
    SessionConfig, SessionContext, VERSION,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "lumen-agent")]
#[command(version = VERSION)]
#[command(about = "Pupillometry session agent with engagement scoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one headless session and print the results
    Run {
        /// Use the deterministic simulator instead of hardware
        #[arg(long)]
        demo: bool,

        /// Light stimulus onset, seconds from session start
        #[arg(long, default_value = "5.0")]
        t_on: f64,

        /// Light stimulus offset, seconds from session start
        #[arg(long, default_value = "15.0")]
        t_off: f64,

        /// Total session duration in seconds
        #[arg(long, default_value = "55.0")]
        total: f64,

        /// Baseline window length ending at onset
        #[arg(long, default_value = "2.0")]
        baseline: f64,

        /// Pupil sensor address (overrides the config file)
        #[arg(long)]
        device: Option<String>,
    },

    /// Show stored engagement records
    History {
        /// Number of most recent records to show
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { host, port } => cmd_serve(host, port),
        Commands::Run {
            demo,
            t_on,
            t_off,
            total,
            baseline,
            device,
        } => cmd_run(demo, t_on, t_off, total, baseline, device),
        Commands::History { limit } => cmd_history(limit),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn build_context(config: &AgentConfig) -> anyhow::Result<Arc<SessionContext>> {
    config.ensure_directories()?;
    let store = EngagementStore::new(config.store_path());
    Ok(SessionContext::new(store, config.ema_alpha))
}

fn cmd_serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = AgentConfig::load()?;
    let ctx = build_context(&config)?;

    let server_config = ServerConfig {
        host: host.unwrap_or_else(|| config.host.clone()),
        port: port.unwrap_or(config.port),
        device_address: config.device_address.clone(),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let (addr, shutdown) = server::run(server_config, ctx).await?;
        println!("Lumen Session Agent v{VERSION}");
        println!("Listening on http://{addr}");
        println!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c().await?;
        let _ = shutdown.send(());
        println!();
        println!("Shutting down.");
        Ok(())
    })
}

fn cmd_run(
    demo: bool,
    t_on: f64,
    t_off: f64,
    total: f64,
    baseline: f64,
    device: Option<String>,
) -> anyhow::Result<()> {
    let agent_config = AgentConfig::load()?;
    let ctx = build_context(&agent_config)?;

    let session_config = SessionConfig {
        t_on,
        t_off,
        total_s: total,
        baseline_s: baseline,
        demo,
        ..SessionConfig::default()
    };
    session_config.validate()?;

    let device_address = device.unwrap_or_else(|| agent_config.device_address.clone());

    println!("Lumen Session Agent v{VERSION}");
    println!(
        "Protocol: light on at {t_on}s, off at {t_off}s, {total}s total ({}).",
        if demo { "demo" } else { device_address.as_str() }
    );
    println!("Press Ctrl+C to end the session early");
    println!();

    // Subscribe before starting so no event is missed.
    let subscription = ctx.bus.subscribe();

    let stop_ctx = Arc::clone(&ctx);
    ctrlc::set_handler(move || {
        stop_ctx.request_stop();
    })?;

    let status = start_session(Arc::clone(&ctx), session_config, device_address)?;
    if status != StartStatus::Started {
        anyhow::bail!("a session is already running");
    }

    loop {
        match ctx.bus.next(&subscription, Duration::from_secs(2)) {
            Event::Log { msg } => println!("  {msg}"),
            Event::Phase { phase, elapsed } => println!("[{elapsed:>6.2}s] phase {phase}"),
            Event::Tick { snapshot } => {
                let pupil = snapshot
                    .pupil
                    .map(|p| format!("{p:.2} mm"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "[{:>6.2}s] pupil {pupil} ({} samples)",
                    snapshot.elapsed, snapshot.samples_count
                );
            }
            Event::Done { results } => {
                println!();
                println!("{}", serde_json::to_string_pretty(&results)?);
                break;
            }
            // Gaze updates are too chatty for a terminal; timeouts just
            // mean the loop is between events.
            Event::Gaze { .. } | Event::Timeout => {}
            Event::Batch { .. } => {}
        }
    }

    ctx.bus.unsubscribe(&subscription);
    Ok(())
}

fn cmd_history(limit: usize) -> anyhow::Result<()> {
    let config = AgentConfig::load()?;
    let store = EngagementStore::new(config.store_path());
    let records = store.history(limit);

    if records.is_empty() {
        println!("No engagement records found.");
        println!("Run 'lumen-agent run --demo' to record a session.");
        return Ok(());
    }

    println!("Engagement history ({} most recent)", records.len());
    println!("====================================");
    for record in &records {
        println!(
            "{}  score {:6.2}  ema {:6.2}{}",
            record.timestamp_utc.format("%Y-%m-%d %H:%M:%S"),
            record.session_score,
            record.ema_score,
            if record.retake_recommended {
                "  (retake recommended)"
            } else {
                ""
            }
        );
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = AgentConfig::load()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", AgentConfig::config_path());
    println!("Store file:  {:?}", config.store_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
