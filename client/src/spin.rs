//! Spin requests, the current-outcome cache and free-spin playback.

use crate::bus::Notification;
use crate::client::{is_auth_failure, Client, BET_PATH, DEMO_SPIN_PATH};
use crate::state::SessionState;
use crate::{Error, Result};
use reqwest::StatusCode;
use serde::Serialize;
use slotfront_types::{
    wire::{normalize_spin, BetRequest, DemoSpinRequest},
    SpinOutcome, NO_VALID_FREESPINS,
};
use tracing::{debug, info, warn};

/// What a spin is, decided once per request.
///
/// Free-round and bonus spins are separate variants, so one spin can never be
/// both.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinKind {
    Paid,
    BuyFeature,
    EnhancedBet,
    FreeRound,
    Bonus,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpinRequest {
    pub bet: f64,
    pub buy_feature: bool,
    pub enhanced_bet: bool,
    /// The caller is playing reel-triggered free spins.
    pub bonus_mode: bool,
}

impl SpinRequest {
    pub fn new(bet: f64) -> Self {
        Self {
            bet,
            buy_feature: false,
            enhanced_bet: false,
            bonus_mode: false,
        }
    }

    pub fn with_buy_feature(mut self) -> Self {
        self.buy_feature = true;
        self
    }

    pub fn with_enhanced_bet(mut self) -> Self {
        self.enhanced_bet = true;
        self
    }

    pub fn in_bonus(mut self) -> Self {
        self.bonus_mode = true;
        self
    }

    pub fn is_bonus(&self, session: &SessionState) -> bool {
        self.bonus_mode || session.bonus_active
    }

    pub fn classify(&self, session: &SessionState) -> SpinKind {
        if self.buy_feature {
            SpinKind::BuyFeature
        } else if self.enhanced_bet {
            SpinKind::EnhancedBet
        } else if self.is_bonus(session) {
            SpinKind::Bonus
        } else if session.in_free_round {
            SpinKind::FreeRound
        } else {
            SpinKind::Paid
        }
    }
}

/// A batch-less response arriving mid-bonus must not evict the batch being
/// played back.
pub(crate) fn retain_cached(
    cached: Option<&SpinOutcome>,
    incoming: &SpinOutcome,
    in_bonus: bool,
) -> bool {
    !incoming.has_free_spins() && in_bonus && cached.is_some_and(SpinOutcome::has_free_spins)
}

fn is_free_round_exhausted(status: StatusCode, body: &str) -> bool {
    status == StatusCode::UNPROCESSABLE_ENTITY && body.to_ascii_lowercase().contains(NO_VALID_FREESPINS)
}

impl Client {
    /// Request one spin.
    ///
    /// Returns `Ok(None)` when a free-round spin finds the server bank empty;
    /// the free-round session is over and there is nothing to show.
    pub async fn spin(&self, request: SpinRequest) -> Result<Option<SpinOutcome>> {
        let demo = self.store.is_demo();
        let mut session = self.session_state();
        if demo {
            // Demo spins never draw on the server's free-round bank.
            session.in_free_round = false;
        }
        let kind = request.classify(&session);

        let response = if demo {
            let url = self.endpoint(DEMO_SPIN_PATH)?;
            debug!(%url, bet = request.bet, ?kind, "demo spin");
            self.http_client
                .post(url)
                .json(&DemoSpinRequest {
                    bet_amount: request.bet,
                    buy_feature: request.buy_feature,
                    enhanced_bet: request.enhanced_bet,
                })
                .send()
                .await?
        } else {
            let token = self.require_token()?;
            let url = self.endpoint(BET_PATH)?;
            debug!(%url, bet = request.bet, ?kind, "spin");
            self.http_client
                .post(url)
                .bearer_auth(token)
                .json(&BetRequest {
                    bet: request.bet,
                    is_buy_fs: request.buy_feature,
                    is_enhanced_bet: request.enhanced_bet,
                    is_free_round: kind == SpinKind::FreeRound,
                })
                .send()
                .await?
        };

        let status = response.status();
        let body = response.text().await?;
        if kind == SpinKind::FreeRound && is_free_round_exhausted(status, &body) {
            info!("server reports no free rounds left; ending free-round session");
            self.set_in_free_round(false);
            self.bus
                .publish(Notification::FreeRoundCountUpdated { remaining: 0 });
            return Ok(None);
        }
        if !demo && is_auth_failure(status) {
            self.expire_session(status);
            return Err(Error::Unauthorized { status, body });
        }
        if !status.is_success() {
            warn!(%status, ?kind, "spin request failed");
            return Err(Error::SpinRequestFailed { status, body });
        }

        let outcome = match normalize_spin(serde_json::from_str(&body)?) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "unrecognized spin response");
                return Err(err.into());
            }
        };

        {
            let mut state = self.lock_state();
            // Bonus mode may have started while the request was in flight.
            let in_bonus = request.is_bonus(&state.session);
            if retain_cached(state.current.as_ref(), &outcome, in_bonus) {
                debug!("keeping cached free-spin batch over batch-less response");
            } else {
                state.current = Some(outcome.clone());
            }
        }

        if kind == SpinKind::FreeRound {
            // Server count wins; count locally only when the server sent none.
            match outcome.free_round_remaining {
                Some(remaining) => {
                    self.bus
                        .publish(Notification::FreeRoundCountUpdated { remaining });
                }
                None => self.ledger.consume_one(),
            }
            if !self.ledger.is_active() {
                info!("free-round bank empty; leaving free-round mode");
                self.set_in_free_round(false);
            }
        }

        let total_win = outcome.total_win();
        debug!(?kind, total_win, free_spins = outcome.has_free_spins(), "spin completed");
        self.bus
            .publish(Notification::SpinCompleted { kind, total_win });
        Ok(Some(outcome))
    }

    /// Play the next pre-computed item of the cached free-spin batch.
    ///
    /// The synthetic outcome replaces the cache and the playback index moves
    /// forward by one.
    pub fn next_free_spin(&self) -> Result<SpinOutcome> {
        let outcome = {
            let mut state = self.lock_state();
            let index = state.playback_index;
            let batch = state
                .current
                .as_ref()
                .and_then(|current| current.free_spins.as_ref())
                .ok_or(Error::NoFreeSpinData)?;
            match batch.items.get(index) {
                Some(item) if item.spins_left > 0 => {}
                _ => return Err(Error::NoMoreFreeSpins),
            }
            let outcome = state
                .current
                .as_ref()
                .and_then(|current| current.from_free_spin_item(index))
                .ok_or(Error::NoMoreFreeSpins)?;
            state.current = Some(outcome.clone());
            state.playback_index = index + 1;
            outcome
        };

        let total_win = outcome.total_win();
        debug!(
            index = outcome.playback.map(|position| position.index),
            total_win, "free spin played"
        );
        self.bus.publish(Notification::SpinCompleted {
            kind: SpinKind::Bonus,
            total_win,
        });
        Ok(outcome)
    }

    /// Restart free-spin playback at item zero.
    pub fn start_new_batch(&self) {
        debug!("free-spin playback reset");
        self.lock_state().playback_index = 0;
    }

    pub fn playback_index(&self) -> usize {
        self.lock_state().playback_index
    }

    pub fn current_outcome(&self) -> Option<SpinOutcome> {
        self.lock_state().current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotfront_types::FreeSpinBatch;

    fn outcome(batch: bool) -> SpinOutcome {
        SpinOutcome {
            player_id: None,
            bet: 1.0,
            grid: vec![vec![1, 2, 3]],
            paylines: Vec::new(),
            free_spins: batch.then(FreeSpinBatch::default),
            free_round_remaining: None,
            playback: None,
        }
    }

    #[test]
    fn test_classify_precedence() {
        let idle = SessionState::default();
        let free_round = SessionState {
            in_free_round: true,
            bonus_active: false,
        };
        let both = SessionState {
            in_free_round: true,
            bonus_active: true,
        };

        assert_eq!(SpinRequest::new(1.0).classify(&idle), SpinKind::Paid);
        assert_eq!(SpinRequest::new(1.0).classify(&free_round), SpinKind::FreeRound);
        assert_eq!(
            SpinRequest::new(1.0).with_buy_feature().classify(&free_round),
            SpinKind::BuyFeature
        );
        assert_eq!(
            SpinRequest::new(1.0).with_enhanced_bet().classify(&free_round),
            SpinKind::EnhancedBet
        );
        // Bonus play never counts as a free round.
        assert_eq!(SpinRequest::new(1.0).in_bonus().classify(&free_round), SpinKind::Bonus);
        assert_eq!(SpinRequest::new(1.0).classify(&both), SpinKind::Bonus);
    }

    #[test]
    fn test_retain_cached_policy() {
        let with_batch = outcome(true);
        let plain = outcome(false);

        assert!(retain_cached(Some(&with_batch), &plain, true));
        assert!(!retain_cached(Some(&with_batch), &plain, false));
        assert!(!retain_cached(Some(&with_batch), &with_batch, true));
        assert!(!retain_cached(Some(&plain), &plain, true));
        assert!(!retain_cached(None, &plain, true));
    }

    #[test]
    fn test_free_round_exhaustion_detection() {
        assert!(is_free_round_exhausted(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"No valid freespins available"}"#
        ));
        assert!(!is_free_round_exhausted(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Insufficient balance"}"#
        ));
        assert!(!is_free_round_exhausted(
            StatusCode::BAD_REQUEST,
            "No valid freespins available"
        ));
    }
}
