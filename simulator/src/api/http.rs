use axum::{
    extract::{Query, State as AxumState},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use slotfront_types::wire::{
    Amount, BetRequest, DemoSpinRequest, Envelope, ErrorBody, LooseId, RawBalance, RawFreeRound,
    RawHistory, RawHistoryMeta, RawHistoryRow, RawSessionInit, RawSpin, RawTokenGrant,
    TokenRequest,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::game::{self, cents, spin_cost};
use crate::{Route, ScriptedResponse, Simulator};

const DEFAULT_HISTORY_LIMIT: u32 = 10;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

#[derive(Deserialize)]
pub(super) struct HistoryQuery {
    limit: Option<u32>,
    page: Option<u32>,
}

fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            message: message.to_string(),
        }),
    )
        .into_response()
}

async fn scripted(response: ScriptedResponse) -> Response {
    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Resolve the bearer token to a known player.
fn authorize(simulator: &Simulator, headers: &HeaderMap) -> Result<String, Response> {
    let unauthorized = || error(StatusCode::UNAUTHORIZED, "Unauthorized");
    let token = bearer(headers).ok_or_else(unauthorized)?;
    if simulator.state().players.contains_key(&token) {
        Ok(token)
    } else {
        Err(unauthorized())
    }
}

fn now() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
        .to_string()
}

pub(super) async fn healthz() -> impl IntoResponse {
    Json(HealthzResponse { ok: true })
}

pub(super) async fn generate_url(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
    Json(request): Json<TokenRequest>,
) -> Response {
    if let Some(response) = simulator.begin(Route::GenerateUrl) {
        return scripted(response).await;
    }
    if let Some(expected) = simulator.config.access_token.as_deref() {
        if bearer(&headers).as_deref() != Some(expected) {
            return error(StatusCode::UNAUTHORIZED, "Invalid access token");
        }
    }
    let token = Uuid::new_v4().to_string();
    simulator.register_token(&token);
    tracing::info!(
        game_id = %request.game_id,
        player_id = %request.player_id,
        "token issued"
    );
    let separator = if simulator.config.game_url.contains('?') {
        '&'
    } else {
        '?'
    };
    let url = format!("{}{separator}token={token}", simulator.config.game_url);
    Json(Envelope::wrap(RawTokenGrant { url, token })).into_response()
}

pub(super) async fn initialize(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
) -> Response {
    if let Some(response) = simulator.begin(Route::Initialize) {
        return scripted(response).await;
    }
    let token = match authorize(&simulator, &headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let state = simulator.state();
    let Some(player) = state.players.get(&token) else {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    };
    let remaining = player.free_rounds_remaining();
    let free_round = (player.free_round_total > 0).then(|| RawFreeRound {
        total: player.free_round_total,
        used: player.free_round_used,
        remaining: Some(remaining),
        bet: Some(Amount::Number(simulator.config.free_round_bet)),
    });
    Json(Envelope::wrap(RawSessionInit {
        has_free_round: remaining > 0,
        free_round,
        balance: Some(Amount::Number(player.balance)),
        currency: Some("USD".to_string()),
        player_id: Some(LooseId::Text(player.id.clone())),
    }))
    .into_response()
}

pub(super) async fn balance(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
) -> Response {
    if let Some(response) = simulator.begin(Route::Balance) {
        return scripted(response).await;
    }
    let token = match authorize(&simulator, &headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    match simulator.balance_of(&token) {
        Some(balance) => Json(Envelope::wrap(RawBalance {
            balance: Amount::Number(balance),
        }))
        .into_response(),
        None => error(StatusCode::UNAUTHORIZED, "Unauthorized"),
    }
}

pub(super) async fn bet(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
    Json(request): Json<BetRequest>,
) -> Response {
    if let Some(response) = simulator.begin(Route::Bet) {
        return scripted(response).await;
    }
    let token = match authorize(&simulator, &headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    if !request.bet.is_finite() || request.bet <= 0.0 {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Invalid bet");
    }

    let award = simulator.config.free_spin_award;
    let mut guard = simulator.state();
    let state = &mut *guard;
    let Some(player) = state.players.get_mut(&token) else {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    };

    // Free rounds are staked by the operator, not the player.
    let (stake, fs_count) = if request.is_free_round {
        if player.free_rounds_remaining() == 0 {
            return error(StatusCode::UNPROCESSABLE_ENTITY, "No valid freespins available");
        }
        player.free_round_used += 1;
        (0.0, Some(player.free_rounds_remaining()))
    } else {
        let cost = spin_cost(request.bet, request.is_buy_fs, request.is_enhanced_bet);
        if cost > player.balance {
            return error(StatusCode::UNPROCESSABLE_ENTITY, "Insufficient balance");
        }
        (cost, None)
    };

    let result = game::spin(
        &mut state.rng,
        request.bet,
        request.is_buy_fs,
        request.is_enhanced_bet,
        award,
    );
    player.balance = cents(player.balance - stake + result.payout);
    let round = state.next_round;
    state.next_round += 1;
    player.history.push(RawHistoryRow {
        id: LooseId::Text(format!("round-{round}")),
        bet: Amount::Number(request.bet),
        win: Some(Amount::Number(result.payout)),
        created_at: Some(now()),
        is_free_round: request.is_free_round,
    });
    tracing::debug!(
        player_id = %player.id,
        bet = request.bet,
        payout = result.payout,
        free_round = request.is_free_round,
        "spin settled"
    );

    Json(Envelope::wrap(RawSpin {
        player_id: Some(LooseId::Text(player.id.clone())),
        bet: Some(Amount::Number(request.bet)),
        slot: result.slot,
        fs_count,
    }))
    .into_response()
}

pub(super) async fn demo_spin(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Json(request): Json<DemoSpinRequest>,
) -> Response {
    if let Some(response) = simulator.begin(Route::DemoSpin) {
        return scripted(response).await;
    }
    if !request.bet_amount.is_finite() || request.bet_amount <= 0.0 {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Invalid bet");
    }
    let award = simulator.config.free_spin_award;
    let result = {
        let mut state = simulator.state();
        game::spin(
            &mut state.rng,
            request.bet_amount,
            request.buy_feature,
            request.enhanced_bet,
            award,
        )
    };
    Json(RawSpin {
        player_id: None,
        bet: Some(Amount::Number(request.bet_amount)),
        slot: result.slot,
        fs_count: None,
    })
    .into_response()
}

pub(super) async fn histories(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response {
    if let Some(response) = simulator.begin(Route::History) {
        return scripted(response).await;
    }
    let token = match authorize(&simulator, &headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(1);
    let page = query.page.unwrap_or(1).max(1);
    let state = simulator.state();
    let Some(player) = state.players.get(&token) else {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    };
    let skip = (page as usize - 1).saturating_mul(limit as usize);
    let data = player
        .history
        .iter()
        .rev()
        .skip(skip)
        .take(limit as usize)
        .cloned()
        .collect();
    Json(RawHistory::Paged {
        data,
        meta: Some(RawHistoryMeta {
            page: Some(page),
            limit: Some(limit),
            total: Some(player.history.len() as u64),
        }),
    })
    .into_response()
}
