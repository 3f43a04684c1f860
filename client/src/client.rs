use crate::bus::{Notification, NotificationBus};
use crate::ledger::FreeRoundLedger;
use crate::state::SessionState;
use crate::store::{LaunchParams, SessionStore};
use crate::{Error, Result};
use reqwest::StatusCode;
use slotfront_types::{
    wire::{normalize_balance, normalize_history, normalize_session_init, normalize_token_grant, TokenRequest},
    HistoryPage, SessionInit, SpinOutcome, TokenGrant,
};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub(crate) const GENERATE_URL_PATH: &str = "api/v1/generate_url";
pub(crate) const INITIALIZE_PATH: &str = "api/v1/slots/initialize";
pub(crate) const BALANCE_PATH: &str = "api/v1/slots/balance";
pub(crate) const BET_PATH: &str = "api/v1/slots/bet";
pub(crate) const DEMO_SPIN_PATH: &str = "api/v1/analytics/spin";
pub(crate) const HISTORY_PATH: &str = "api/v1/games/me/histories";

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_DEMO_BALANCE: f64 = 1_000.0;

/// Fixed operator identity sent with token issuance.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    pub operator_id: String,
    pub bank_group_id: String,
    pub game_id: String,
    pub player_id: String,
    pub currency: String,
    pub language: String,
    pub access_token: String,
    pub brand_id: String,
    /// Generated per issuance when unset.
    pub session_id: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            operator_id: "slotfront".to_string(),
            bank_group_id: "default".to_string(),
            game_id: "kobi-ass".to_string(),
            player_id: "guest".to_string(),
            currency: "USD".to_string(),
            language: "en".to_string(),
            access_token: String::new(),
            brand_id: String::new(),
            session_id: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    /// Balance reported in demo mode.
    pub demo_balance: f64,
    /// Per-request timeout. `None` leaves it to the transport.
    pub request_timeout: Option<Duration>,
    pub operator: OperatorConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            demo_balance: DEFAULT_DEMO_BALANCE,
            request_timeout: None,
            operator: OperatorConfig::default(),
        }
    }
}

fn env_string(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    let raw = env_string(var)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let operator = defaults.operator;
        Self {
            base_url: env_string("SLOTFRONT_API_URL").unwrap_or(defaults.base_url),
            demo_balance: env_parse("SLOTFRONT_DEMO_BALANCE").unwrap_or(defaults.demo_balance),
            request_timeout: env_parse::<u64>("SLOTFRONT_REQUEST_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            operator: OperatorConfig {
                operator_id: env_string("SLOTFRONT_OPERATOR_ID").unwrap_or(operator.operator_id),
                bank_group_id: env_string("SLOTFRONT_BANK_GROUP_ID")
                    .unwrap_or(operator.bank_group_id),
                game_id: env_string("SLOTFRONT_GAME_ID").unwrap_or(operator.game_id),
                player_id: env_string("SLOTFRONT_PLAYER_ID").unwrap_or(operator.player_id),
                currency: env_string("SLOTFRONT_CURRENCY").unwrap_or(operator.currency),
                language: operator.language,
                access_token: env_string("SLOTFRONT_ACCESS_TOKEN")
                    .unwrap_or(operator.access_token),
                brand_id: env_string("SLOTFRONT_BRAND_ID").unwrap_or(operator.brand_id),
                session_id: operator.session_id,
            },
        }
    }
}

#[derive(Default)]
pub(crate) struct ClientState {
    pub(crate) session: SessionState,
    pub(crate) current: Option<SpinOutcome>,
    pub(crate) playback_index: usize,
    pub(crate) init: Option<SessionInit>,
}

pub(crate) fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED
}

/// Single point of contact with the game server for one player session.
pub struct Client {
    pub base_url: Url,
    pub http_client: reqwest::Client,
    pub(crate) config: ClientConfig,
    pub(crate) store: SessionStore,
    pub(crate) bus: NotificationBus,
    pub(crate) ledger: FreeRoundLedger,
    state: Mutex<ClientState>,
}

impl Client {
    pub fn new(config: ClientConfig, store: SessionStore, bus: NotificationBus) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url)?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Error::InvalidScheme(scheme.to_string())),
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        if !config.demo_balance.is_finite() || config.demo_balance < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "demo balance must be a non-negative number, got {}",
                config.demo_balance
            )));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;
        let ledger = FreeRoundLedger::new(&bus);

        Ok(Self {
            base_url,
            http_client,
            config,
            store,
            bus,
            ledger,
            state: Mutex::new(ClientState::default()),
        })
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("client state lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Stored token, or `AuthRequired` after telling observers the session is gone.
    pub(crate) fn require_token(&self) -> Result<String> {
        match self.store.token() {
            Some(token) => Ok(token),
            None => {
                warn!("no session token available");
                self.bus.publish(Notification::SessionExpired);
                Err(Error::AuthRequired)
            }
        }
    }

    pub(crate) fn expire_session(&self, status: StatusCode) {
        warn!(%status, "session rejected by server; clearing token");
        self.store.clear_token();
        self.bus.publish(Notification::SessionExpired);
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn ledger(&self) -> &FreeRoundLedger {
        &self.ledger
    }

    pub fn is_demo(&self) -> bool {
        self.store.is_demo()
    }

    pub fn session_state(&self) -> SessionState {
        self.lock_state().session
    }

    pub fn set_in_free_round(&self, in_free_round: bool) {
        self.lock_state().session.in_free_round = in_free_round;
    }

    pub fn set_bonus_active(&self, bonus_active: bool) {
        self.lock_state().session.bonus_active = bonus_active;
    }

    /// Payload cached by the last successful initialization.
    pub fn session_init(&self) -> Option<SessionInit> {
        self.lock_state().init.clone()
    }

    /// Request a session token for this operator and store it.
    pub async fn issue_token(&self, launch: &LaunchParams) -> Result<TokenGrant> {
        let operator = &self.config.operator;
        let request = TokenRequest {
            operator_id: operator.operator_id.clone(),
            bank_group_id: operator.bank_group_id.clone(),
            game_id: operator.game_id.clone(),
            session_id: operator
                .session_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            player_id: operator.player_id.clone(),
            currency: operator.currency.clone(),
            language: operator.language.clone(),
            device: launch.device.clone().or_else(|| self.store.device()),
            exit_url: launch.api_exit.clone().or_else(|| self.store.exit_url()),
        };
        let url = self.endpoint(GENERATE_URL_PATH)?;
        debug!(%url, game_id = %request.game_id, "issuing session token");

        let response = self
            .http_client
            .post(url)
            .bearer_auth(&operator.access_token)
            .header("X-Brand-Id", &operator.brand_id)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, "token issuance failed");
            return Err(Error::Network { status, body });
        }

        let grant = normalize_token_grant(serde_json::from_str(&body)?)?;
        self.store.set_token(&grant.token);
        info!("session token issued");
        Ok(grant)
    }

    /// Initialize the session. Never fails: any error yields the default
    /// payload (no free rounds) so the game can still start.
    pub async fn initialize_session(&self, token: &str) -> SessionInit {
        let init = match self.try_initialize(token).await {
            Ok(init) => init,
            Err(err) => {
                warn!(error = %err, "session initialization failed; continuing without free rounds");
                SessionInit::default()
            }
        };

        // A session without a grant must not inherit an earlier one.
        let grant = init.active_grant().cloned().unwrap_or_default();
        self.ledger.seed(&grant);
        let in_free_round = grant.remaining > 0;
        {
            let mut state = self.lock_state();
            state.init = Some(init.clone());
            state.session.in_free_round = in_free_round;
        }
        info!(
            has_free_round = init.has_free_round,
            in_free_round, "session initialized"
        );
        self.bus.publish(Notification::SessionReady {
            has_free_round: init.has_free_round,
        });
        init
    }

    async fn try_initialize(&self, token: &str) -> Result<SessionInit> {
        let url = self.endpoint(INITIALIZE_PATH)?;
        debug!(%url, "initializing session");
        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::FailedWithBody { status, body });
        }
        Ok(normalize_session_init(serde_json::from_str(&body)?)?)
    }

    /// Current balance. Demo mode answers locally.
    pub async fn fetch_balance(&self) -> Result<f64> {
        if self.store.is_demo() {
            debug!(balance = self.config.demo_balance, "demo balance");
            return Ok(self.config.demo_balance);
        }
        let token = self.require_token()?;
        let url = self.endpoint(BALANCE_PATH)?;
        debug!(%url, "fetching balance");

        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if is_auth_failure(status) {
            self.expire_session(status);
            return Err(Error::Unauthorized { status, body });
        }
        if !status.is_success() {
            return Err(Error::FailedWithBody { status, body });
        }
        Ok(normalize_balance(serde_json::from_str(&body)?)?)
    }

    /// One page of the player's game history. Demo mode has none.
    pub async fn fetch_history(&self, limit: u32, page: u32) -> Result<HistoryPage> {
        if self.store.is_demo() {
            return Ok(HistoryPage::empty(limit, page));
        }
        let token = self.require_token()?;
        let mut url = self.endpoint(HISTORY_PATH)?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("page", &page.to_string());
        debug!(%url, "fetching history");

        let response = self.http_client.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if is_auth_failure(status) {
            self.expire_session(status);
            return Err(Error::Unauthorized { status, body });
        }
        if !status.is_success() {
            return Err(Error::FailedWithBody { status, body });
        }
        Ok(normalize_history(serde_json::from_str(&body)?, limit, page)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(base_url: &str) -> Result<Client> {
        Client::new(
            ClientConfig {
                base_url: base_url.to_string(),
                ..ClientConfig::default()
            },
            SessionStore::in_memory(),
            NotificationBus::new(),
        )
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = client_for("https://games.example/backend").unwrap();
        assert_eq!(client.base_url.as_str(), "https://games.example/backend/");
        assert_eq!(
            client.endpoint(BALANCE_PATH).unwrap().as_str(),
            "https://games.example/backend/api/v1/slots/balance"
        );

        let client = client_for("http://127.0.0.1:9000").unwrap();
        assert_eq!(
            client.endpoint(BET_PATH).unwrap().as_str(),
            "http://127.0.0.1:9000/api/v1/slots/bet"
        );
    }

    #[test]
    fn test_rejects_bad_base_urls() {
        assert!(matches!(
            client_for("ftp://games.example"),
            Err(Error::InvalidScheme(scheme)) if scheme == "ftp"
        ));
        assert!(matches!(client_for("not a url"), Err(Error::Url(_))));
    }

    #[test]
    fn test_rejects_negative_demo_balance() {
        let result = Client::new(
            ClientConfig {
                demo_balance: -1.0,
                ..ClientConfig::default()
            },
            SessionStore::in_memory(),
            NotificationBus::new(),
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_session_flag_setters() {
        let client = client_for(DEFAULT_BASE_URL).unwrap();
        assert_eq!(client.session_state(), SessionState::default());
        client.set_in_free_round(true);
        client.set_bonus_active(true);
        let state = client.session_state();
        assert!(state.in_free_round);
        assert!(state.bonus_active);
    }
}
