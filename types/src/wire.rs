//! Game server JSON shapes and their normalization into canonical types.
//!
//! The server is loose about its responses: payloads may or may not sit under a
//! `data` envelope, the free-spin block is spelled `freespin` or `freeSpin`,
//! amounts arrive as numbers or numeric strings. All of that is absorbed here;
//! callers only ever see [SpinOutcome], [SessionInit] and friends.

use crate::outcome::{FreeSpinBatch, FreeSpinItem, Payline, SpinOutcome};
use crate::session::{FreeRoundGrant, HistoryPage, HistoryRow, SessionInit, TokenGrant};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("unrecognized {kind} payload: {reason}")]
    Unrecognized { kind: &'static str, reason: String },
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),
    #[error("spin payload has an empty grid")]
    EmptyGrid,
}

/// Payload optionally wrapped in `{"data": ...}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn wrap(data: T) -> Self {
        Envelope::Wrapped { data }
    }

    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(data) => data,
        }
    }
}

/// Monetary amount as sent by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    pub fn to_f64(&self) -> Result<f64, ShapeError> {
        match self {
            Amount::Number(value) => Ok(*value),
            Amount::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| ShapeError::InvalidAmount(text.clone())),
        }
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Amount::Number(value)
    }
}

/// Identifier sent either as a string or a number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseId {
    Text(String),
    Number(serde_json::Number),
}

impl std::fmt::Display for LooseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LooseId::Text(text) => f.write_str(text),
            LooseId::Number(number) => write!(f, "{number}"),
        }
    }
}

fn optional_amount(amount: Option<&Amount>) -> Result<Option<f64>, ShapeError> {
    amount.map(Amount::to_f64).transpose()
}

// ---------------------------------------------------------------------------
// Requests

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub operator_id: String,
    pub bank_group_id: String,
    pub game_id: String,
    pub session_id: String,
    pub player_id: String,
    pub currency: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_url: Option<String>,
}

/// Real-money spin body for `/api/v1/slots/bet`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetRequest {
    pub bet: f64,
    #[serde(default)]
    pub is_buy_fs: bool,
    #[serde(default)]
    pub is_enhanced_bet: bool,
    #[serde(default)]
    pub is_free_round: bool,
}

/// Demo spin body for `/api/v1/analytics/spin`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoSpinRequest {
    pub bet_amount: f64,
    #[serde(default)]
    pub buy_feature: bool,
    #[serde(default)]
    pub enhanced_bet: bool,
}

/// Error body returned by the server alongside non-2xx statuses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Responses

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawTokenGrant {
    pub url: String,
    pub token: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFreeRound {
    #[serde(default, alias = "totalFreeRounds")]
    pub total: u32,
    #[serde(default)]
    pub used: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(default, alias = "betAmount", skip_serializing_if = "Option::is_none")]
    pub bet: Option<Amount>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSessionInit {
    #[serde(default)]
    pub has_free_round: bool,
    #[serde(default, alias = "freeRounds", skip_serializing_if = "Option::is_none")]
    pub free_round: Option<RawFreeRound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<LooseId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawBalance {
    pub balance: Amount,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPayline {
    #[serde(alias = "line")]
    pub line_id: u32,
    pub symbol: u32,
    pub count: u32,
    #[serde(alias = "amount")]
    pub win: Amount,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFreeSpinItem {
    pub area: Vec<Vec<u32>>,
    #[serde(default)]
    pub paylines: Vec<RawPayline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_total_win: Option<Amount>,
    #[serde(alias = "spinsRemaining")]
    pub spins_left: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFreeSpin {
    #[serde(default, alias = "total")]
    pub count: u32,
    #[serde(default)]
    pub used: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_win: Option<Amount>,
    #[serde(default)]
    pub items: Vec<RawFreeSpinItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSlot {
    pub area: Vec<Vec<u32>>,
    #[serde(default)]
    pub paylines: Vec<RawPayline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freespin: Option<RawFreeSpin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_spin: Option<RawFreeSpin>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSpin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<LooseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bet: Option<Amount>,
    pub slot: RawSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_count: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHistoryRow {
    pub id: LooseId,
    pub bet: Amount,
    #[serde(default, alias = "winAmount", skip_serializing_if = "Option::is_none")]
    pub win: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub is_free_round: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawHistoryMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawHistory {
    Paged {
        data: Vec<RawHistoryRow>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<RawHistoryMeta>,
    },
    Bare(Vec<RawHistoryRow>),
}

// ---------------------------------------------------------------------------
// Normalization

fn decode<T: DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, ShapeError> {
    serde_json::from_value(value).map_err(|err| ShapeError::Unrecognized {
        kind,
        reason: err.to_string(),
    })
}

fn payline(raw: &RawPayline) -> Result<Payline, ShapeError> {
    Ok(Payline {
        line_id: raw.line_id,
        symbol: raw.symbol,
        count: raw.count,
        win: raw.win.to_f64()?,
    })
}

fn paylines(raw: &[RawPayline]) -> Result<Vec<Payline>, ShapeError> {
    raw.iter().map(payline).collect()
}

fn free_spin_batch(raw: &RawFreeSpin) -> Result<FreeSpinBatch, ShapeError> {
    let items = raw
        .items
        .iter()
        .map(|item| {
            let lines = paylines(&item.paylines)?;
            let sub_total_win = match item.sub_total_win.as_ref() {
                Some(amount) => amount.to_f64()?,
                None => lines.iter().map(|line| line.win).sum(),
            };
            Ok(FreeSpinItem {
                grid: item.area.clone(),
                paylines: lines,
                sub_total_win,
                spins_left: item.spins_left,
            })
        })
        .collect::<Result<Vec<_>, ShapeError>>()?;
    Ok(FreeSpinBatch {
        total: raw.count,
        used: raw.used,
        remaining: raw
            .remaining
            .unwrap_or_else(|| raw.count.saturating_sub(raw.used)),
        total_win: optional_amount(raw.total_win.as_ref())?.unwrap_or(0.0),
        items,
    })
}

pub fn normalize_token_grant(value: Value) -> Result<TokenGrant, ShapeError> {
    let raw: Envelope<RawTokenGrant> = decode("token grant", value)?;
    let raw = raw.into_inner();
    Ok(TokenGrant {
        url: raw.url,
        token: raw.token,
    })
}

pub fn normalize_session_init(value: Value) -> Result<SessionInit, ShapeError> {
    let raw: Envelope<RawSessionInit> = decode("session init", value)?;
    let raw = raw.into_inner();
    let free_round = match raw.free_round {
        Some(grant) => Some(FreeRoundGrant {
            total: grant.total,
            used: grant.used,
            remaining: grant
                .remaining
                .unwrap_or_else(|| grant.total.saturating_sub(grant.used)),
            bet: optional_amount(grant.bet.as_ref())?,
        }),
        None => None,
    };
    Ok(SessionInit {
        has_free_round: raw.has_free_round,
        free_round,
        balance: optional_amount(raw.balance.as_ref())?,
        currency: raw.currency,
        player_id: raw.player_id.map(|id| id.to_string()),
    })
}

pub fn normalize_balance(value: Value) -> Result<f64, ShapeError> {
    let raw: Envelope<RawBalance> = decode("balance", value)?;
    raw.into_inner().balance.to_f64()
}

pub fn normalize_spin(value: Value) -> Result<SpinOutcome, ShapeError> {
    let raw: Envelope<RawSpin> = decode("spin", value)?;
    let raw = raw.into_inner();
    if raw.slot.area.is_empty() {
        return Err(ShapeError::EmptyGrid);
    }
    let free_spins = match raw.slot.freespin.as_ref().or(raw.slot.free_spin.as_ref()) {
        Some(block) => Some(free_spin_batch(block)?),
        None => None,
    };
    Ok(SpinOutcome {
        player_id: raw.player_id.map(|id| id.to_string()),
        bet: optional_amount(raw.bet.as_ref())?.unwrap_or(0.0),
        grid: raw.slot.area,
        paylines: paylines(&raw.slot.paylines)?,
        free_spins,
        free_round_remaining: raw.fs_count,
        playback: None,
    })
}

pub fn normalize_history(value: Value, limit: u32, page: u32) -> Result<HistoryPage, ShapeError> {
    let raw: RawHistory = decode("history", value)?;
    let (rows, meta) = match raw {
        RawHistory::Paged { data, meta } => (data, meta),
        RawHistory::Bare(rows) => (rows, None),
    };
    let rows = rows
        .iter()
        .map(|row| {
            Ok(HistoryRow {
                id: row.id.to_string(),
                bet: row.bet.to_f64()?,
                win: optional_amount(row.win.as_ref())?.unwrap_or(0.0),
                created_at: row.created_at.clone(),
                is_free_round: row.is_free_round,
            })
        })
        .collect::<Result<Vec<_>, ShapeError>>()?;
    let meta = meta.unwrap_or(RawHistoryMeta {
        page: None,
        limit: None,
        total: None,
    });
    Ok(HistoryPage {
        rows,
        page: meta.page.unwrap_or(page),
        limit: meta.limit.unwrap_or(limit),
        total: meta.total,
    })
}
