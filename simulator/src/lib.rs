//! Local stand-in for the slot game backend.
//!
//! Serves the same endpoints as the production server so the client can be
//! driven end to end. Outcomes come from a seeded RNG; tests can additionally
//! queue canned responses per route and inspect how often each route was hit.

use rand::{rngs::StdRng, SeedableRng};
use serde_json::Value;
use slotfront_types::wire::RawHistoryRow;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

mod api;
pub use api::Api;

pub mod game;

const DEFAULT_STARTING_BALANCE: f64 = 500.0;
const DEFAULT_FREE_SPIN_AWARD: u32 = 8;
const DEFAULT_GAME_URL: &str = "http://localhost:5173/";
const DEFAULT_SEED: u64 = 0;

#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    pub starting_balance: f64,
    /// Free rounds granted to every new token.
    pub free_rounds: u32,
    pub free_round_bet: f64,
    /// Free spins in a reel-triggered batch.
    pub free_spin_award: u32,
    pub seed: u64,
    /// Required bearer token for `generate_url` when set.
    pub access_token: Option<String>,
    pub game_url: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            starting_balance: DEFAULT_STARTING_BALANCE,
            free_rounds: 0,
            free_round_bet: 0.2,
            free_spin_award: DEFAULT_FREE_SPIN_AWARD,
            seed: DEFAULT_SEED,
            access_token: None,
            game_url: DEFAULT_GAME_URL.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    GenerateUrl,
    Initialize,
    Balance,
    Bet,
    DemoSpin,
    History,
}

/// Canned response returned instead of the simulated one.
#[derive(Clone, Debug)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: Value,
    /// Held back this long before answering.
    pub delay: Option<Duration>,
}

#[derive(Clone, Debug)]
pub(crate) struct Player {
    pub(crate) id: String,
    pub(crate) balance: f64,
    pub(crate) free_round_total: u32,
    pub(crate) free_round_used: u32,
    pub(crate) history: Vec<RawHistoryRow>,
}

impl Player {
    pub(crate) fn free_rounds_remaining(&self) -> u32 {
        self.free_round_total.saturating_sub(self.free_round_used)
    }
}

pub(crate) struct State {
    pub(crate) rng: StdRng,
    pub(crate) players: HashMap<String, Player>,
    pub(crate) next_player: u64,
    pub(crate) next_round: u64,
    scripted: HashMap<Route, VecDeque<ScriptedResponse>>,
    requests: HashMap<Route, u64>,
}

pub struct Simulator {
    pub config: SimulatorConfig,
    state: Mutex<State>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let state = State {
            rng: StdRng::seed_from_u64(config.seed),
            players: HashMap::new(),
            next_player: 1,
            next_round: 1,
            scripted: HashMap::new(),
            requests: HashMap::new(),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("simulator state lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Create a player for `token` with the configured balance and grant.
    pub fn register_token(&self, token: &str) {
        let mut state = self.state();
        state.register(token, &self.config);
    }

    /// Queue a response for the next request to `route`.
    pub fn script(&self, route: Route, status: u16, body: Value) {
        self.push_scripted(route, ScriptedResponse {
            status,
            body,
            delay: None,
        });
    }

    /// Like [Simulator::script], answering only after `delay`.
    pub fn script_delayed(&self, route: Route, status: u16, body: Value, delay: Duration) {
        self.push_scripted(route, ScriptedResponse {
            status,
            body,
            delay: Some(delay),
        });
    }

    fn push_scripted(&self, route: Route, response: ScriptedResponse) {
        self.state()
            .scripted
            .entry(route)
            .or_default()
            .push_back(response);
    }

    pub fn request_count(&self, route: Route) -> u64 {
        self.state().requests.get(&route).copied().unwrap_or(0)
    }

    pub fn balance_of(&self, token: &str) -> Option<f64> {
        self.state().players.get(token).map(|player| player.balance)
    }

    pub fn free_rounds_remaining(&self, token: &str) -> Option<u32> {
        self.state()
            .players
            .get(token)
            .map(Player::free_rounds_remaining)
    }

    /// Count a request and hand back a queued response, if any.
    pub(crate) fn begin(&self, route: Route) -> Option<ScriptedResponse> {
        let mut state = self.state();
        *state.requests.entry(route).or_insert(0) += 1;
        state
            .scripted
            .get_mut(&route)
            .and_then(|queue| queue.pop_front())
    }
}

impl State {
    pub(crate) fn register(&mut self, token: &str, config: &SimulatorConfig) -> Player {
        let id = format!("player-{}", self.next_player);
        self.next_player += 1;
        let player = Player {
            id,
            balance: config.starting_balance,
            free_round_total: config.free_rounds,
            free_round_used: 0,
            history: Vec::new(),
        };
        self.players.insert(token.to_string(), player.clone());
        player
    }
}
