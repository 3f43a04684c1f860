use serde::{Deserialize, Serialize};

/// Result of token issuance: the game launch URL and the session token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub url: String,
    pub token: String,
}

/// Server-granted bank of free rounds, independent of reel-triggered bonuses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FreeRoundGrant {
    pub total: u32,
    pub used: u32,
    pub remaining: u32,
    pub bet: Option<f64>,
}

/// Normalized session initialization payload.
///
/// `Default` is the safe fallback used when initialization fails.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInit {
    pub has_free_round: bool,
    pub free_round: Option<FreeRoundGrant>,
    pub balance: Option<f64>,
    pub currency: Option<String>,
    pub player_id: Option<String>,
}

impl SessionInit {
    /// The grant, only when the server also flagged it as usable.
    pub fn active_grant(&self) -> Option<&FreeRoundGrant> {
        if self.has_free_round {
            self.free_round.as_ref()
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub id: String,
    pub bet: f64,
    pub win: f64,
    pub created_at: Option<String>,
    pub is_free_round: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub rows: Vec<HistoryRow>,
    pub page: u32,
    pub limit: u32,
    pub total: Option<u64>,
}

impl HistoryPage {
    pub fn empty(limit: u32, page: u32) -> Self {
        Self {
            rows: Vec::new(),
            page,
            limit,
            total: Some(0),
        }
    }
}
