//! Session play tool - opens a game session against a backend and plays spins.
//!
//! Usage:
//!   cargo run --release --bin session-play -- --url http://localhost:8080 --spins 10
//!   cargo run --release --bin session-play -- --launch-url "https://game.example/?demo=true"

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use slotfront_client::{
    Client, ClientConfig, Error, FreeRoundStatus, LaunchParams, NotificationBus, SessionStore,
    SpinKind, SpinRequest, WinMeter, WinTotals,
};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Play a slot session against the game backend")]
struct Args {
    /// Backend base URL (falls back to SLOTFRONT_API_URL).
    #[arg(short, long)]
    url: Option<String>,

    /// URL the game was launched with; its query seeds the session store.
    #[arg(long)]
    launch_url: Option<String>,

    /// Play in demo mode regardless of the launch URL.
    #[arg(long)]
    demo: bool,

    /// JSON file persisting the session token between runs.
    #[arg(long)]
    store: Option<PathBuf>,

    #[arg(short, long, default_value_t = 1.0)]
    bet: f64,

    #[arg(short, long, default_value_t = 10)]
    spins: u32,

    /// Buy the free-spin feature on the first paid spin.
    #[arg(long)]
    buy_feature: bool,

    #[arg(long)]
    enhanced_bet: bool,

    /// Number of history rows to include in the summary (0 skips history).
    #[arg(long, default_value_t = 10)]
    history_limit: u32,
}

#[derive(Serialize)]
struct SpinSummary {
    kind: SpinKind,
    total_win: f64,
    free_spins_awarded: usize,
    free_round_remaining: Option<u32>,
}

#[derive(Serialize)]
struct PlayReport {
    generated_at_ms: u64,
    demo: bool,
    player_id: Option<String>,
    starting_balance: Option<f64>,
    final_balance: Option<f64>,
    free_rounds: FreeRoundStatus,
    spins: Vec<SpinSummary>,
    free_spins_played: usize,
    wins: WinTotals,
    history_rows: usize,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn build_client(args: &Args) -> Result<Client> {
    let mut config = ClientConfig::from_env();
    if let Some(url) = &args.url {
        config.base_url = url.clone();
    }
    let store = match &args.store {
        Some(path) => SessionStore::with_file(path),
        None => SessionStore::in_memory(),
    };
    Client::new(config, store, NotificationBus::new()).context("failed to build client")
}

async fn fetch_balance(client: &Client) -> Option<f64> {
    match client.fetch_balance().await {
        Ok(balance) => Some(balance),
        Err(err) => {
            warn!(error = %err, "balance unavailable");
            None
        }
    }
}

/// Play every item of the cached free-spin batch.
fn play_free_spins(client: &Client) -> Result<usize> {
    client.set_bonus_active(true);
    client.start_new_batch();
    let mut played = 0;
    loop {
        match client.next_free_spin() {
            Ok(outcome) => {
                played += 1;
                info!(
                    index = outcome.playback.map(|position| position.index),
                    win = outcome.total_win(),
                    "free spin"
                );
            }
            Err(Error::NoMoreFreeSpins) | Err(Error::NoFreeSpinData) => break,
            Err(err) => {
                client.set_bonus_active(false);
                return Err(err.into());
            }
        }
    }
    client.set_bonus_active(false);
    Ok(played)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    anyhow::ensure!(args.bet.is_finite() && args.bet > 0.0, "bet must be positive");

    let client = build_client(&args)?;
    let meter = WinMeter::new(client.bus());
    let launch = match &args.launch_url {
        Some(url) => LaunchParams::parse(url).context("invalid launch url")?,
        None => LaunchParams::default(),
    };
    client.store().apply_launch_params(&launch);
    if args.demo {
        client.store().set_demo(true);
    }
    let demo = client.is_demo();

    let mut player_id = None;
    if !demo {
        let token = match client.store().token() {
            Some(token) => token,
            None => client.issue_token(&launch).await?.token,
        };
        let init = client.initialize_session(&token).await;
        player_id = init.player_id;
    }
    let starting_balance = fetch_balance(&client).await;

    let mut spins = Vec::new();
    let mut free_spins_played = 0;
    for round in 0..args.spins {
        let mut request = SpinRequest::new(args.bet);
        let kind = request.classify(&client.session_state());
        if kind == SpinKind::Paid {
            if args.buy_feature && round == 0 {
                request = request.with_buy_feature();
            } else if args.enhanced_bet {
                request = request.with_enhanced_bet();
            }
        }
        let kind = request.classify(&client.session_state());
        let Some(outcome) = client.spin(request).await? else {
            info!("free rounds exhausted");
            continue;
        };
        let awarded = outcome
            .free_spins
            .as_ref()
            .map(|batch| batch.items.len())
            .unwrap_or(0);
        spins.push(SpinSummary {
            kind,
            total_win: outcome.total_win(),
            free_spins_awarded: awarded,
            free_round_remaining: outcome.free_round_remaining,
        });
        if awarded > 0 {
            free_spins_played += play_free_spins(&client)?;
        }
    }

    let history_rows = if args.history_limit > 0 {
        match client.fetch_history(args.history_limit, 1).await {
            Ok(page) => page.rows.len(),
            Err(err) => {
                warn!(error = %err, "history unavailable");
                0
            }
        }
    } else {
        0
    };

    let report = PlayReport {
        generated_at_ms: now_ms(),
        demo,
        player_id,
        starting_balance,
        final_balance: fetch_balance(&client).await,
        free_rounds: client.ledger().status(),
        spins,
        free_spins_played,
        wins: meter.totals(),
        history_rows,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
