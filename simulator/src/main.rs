use anyhow::{Context, Result};
use clap::Parser;
use slotfront_simulator::{Api, Simulator, SimulatorConfig};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Local slot game backend", long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Balance credited to every newly issued token.
    #[arg(long)]
    starting_balance: Option<f64>,

    /// Free rounds granted to every newly issued token.
    #[arg(long, default_value_t = 0)]
    free_rounds: u32,

    #[arg(long)]
    free_round_bet: Option<f64>,

    /// Spins awarded by a scatter trigger or a bought feature.
    #[arg(long)]
    free_spin_award: Option<u32>,

    /// RNG seed; the same seed replays the same reels.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Operator token required by `generate_url` (open when omitted).
    #[arg(long)]
    access_token: Option<String>,

    /// Game URL the issued token is appended to.
    #[arg(long)]
    game_url: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_config(args: &Args) -> Result<SimulatorConfig> {
    let mut config = SimulatorConfig {
        free_rounds: args.free_rounds,
        seed: args.seed,
        access_token: args.access_token.clone(),
        ..SimulatorConfig::default()
    };
    if let Some(balance) = args.starting_balance {
        anyhow::ensure!(
            balance.is_finite() && balance >= 0.0,
            "starting balance must be a non-negative amount"
        );
        config.starting_balance = balance;
    }
    if let Some(bet) = args.free_round_bet {
        anyhow::ensure!(bet.is_finite() && bet > 0.0, "free round bet must be positive");
        config.free_round_bet = bet;
    }
    if let Some(award) = args.free_spin_award {
        anyhow::ensure!(award > 0, "free spin award must be at least 1");
        config.free_spin_award = award;
    }
    if let Some(game_url) = &args.game_url {
        url::Url::parse(game_url).context("invalid game url")?;
        config.game_url = game_url.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    init_tracing();

    let config = build_config(&args)?;
    info!(
        starting_balance = config.starting_balance,
        free_rounds = config.free_rounds,
        seed = config.seed,
        "simulator configured"
    );
    let simulator = Arc::new(Simulator::new(config));
    let app = Api::new(simulator).router();

    // Start server
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}
