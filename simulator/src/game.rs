//! Reel math for the simulated backend.
//!
//! Deliberately small: five reels of three rows, three horizontal paylines
//! paying on three or more matches from the left, and a scatter symbol that
//! awards a batch of pre-computed free spins.

use rand::{rngs::StdRng, Rng};
use slotfront_types::wire::{Amount, RawFreeSpin, RawFreeSpinItem, RawPayline, RawSlot};

pub const REELS: usize = 5;
pub const ROWS: usize = 3;
pub const SCATTER: u32 = 9;
/// Scatters on the grid needed to award free spins.
pub const SCATTER_TRIGGER: usize = 3;
pub const BUY_FEATURE_COST: f64 = 100.0;
pub const ENHANCED_BET_COST: f64 = 1.25;

const PAYTABLE: [f64; 9] = [0.2, 0.3, 0.4, 0.5, 0.8, 1.0, 1.5, 2.5, 5.0];

pub fn cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Stake actually charged for a spin.
pub fn spin_cost(bet: f64, buy_feature: bool, enhanced_bet: bool) -> f64 {
    if buy_feature {
        cents(bet * BUY_FEATURE_COST)
    } else if enhanced_bet {
        cents(bet * ENHANCED_BET_COST)
    } else {
        bet
    }
}

fn roll_symbol(rng: &mut StdRng, enhanced: bool) -> u32 {
    let scatter_odds = if enhanced { 20 } else { 40 };
    if rng.gen_range(0..scatter_odds) == 0 {
        SCATTER
    } else {
        rng.gen_range(0..PAYTABLE.len() as u32)
    }
}

/// Grid as columns (`area[reel][row]`).
pub fn roll_grid(rng: &mut StdRng, enhanced: bool) -> Vec<Vec<u32>> {
    (0..REELS)
        .map(|_| (0..ROWS).map(|_| roll_symbol(rng, enhanced)).collect())
        .collect()
}

pub fn evaluate(area: &[Vec<u32>], bet: f64) -> Vec<RawPayline> {
    let mut lines = Vec::new();
    for row in 0..ROWS {
        let Some(symbol) = area.first().and_then(|reel| reel.get(row)).copied() else {
            continue;
        };
        if symbol == SCATTER {
            continue;
        }
        let count = area
            .iter()
            .take_while(|reel| reel.get(row) == Some(&symbol))
            .count();
        if count < 3 {
            continue;
        }
        let win = cents(bet * PAYTABLE[symbol as usize] * (count as f64 - 1.0));
        lines.push(RawPayline {
            line_id: row as u32 + 1,
            symbol,
            count: count as u32,
            win: Amount::Number(win),
        });
    }
    lines
}

pub fn scatter_count(area: &[Vec<u32>]) -> usize {
    area.iter()
        .flatten()
        .filter(|symbol| **symbol == SCATTER)
        .count()
}

fn line_total(lines: &[RawPayline]) -> f64 {
    lines
        .iter()
        .map(|line| line.win.to_f64().unwrap_or(0.0))
        .sum()
}

/// Pre-compute `award` free spins. Items count down `award..=1`.
pub fn free_spin_batch(rng: &mut StdRng, bet: f64, award: u32) -> RawFreeSpin {
    let mut running = 0.0;
    let items = (0..award)
        .map(|index| {
            let area = roll_grid(rng, false);
            let paylines = evaluate(&area, bet);
            running = cents(running + line_total(&paylines));
            RawFreeSpinItem {
                area,
                paylines,
                sub_total_win: Some(Amount::Number(running)),
                spins_left: i64::from(award - index),
            }
        })
        .collect();
    RawFreeSpin {
        count: award,
        used: 0,
        remaining: Some(award),
        total_win: Some(Amount::Number(running)),
        items,
    }
}

/// One spin result and the total it pays out (base lines plus any batch).
pub struct Spin {
    pub slot: RawSlot,
    pub payout: f64,
}

pub fn spin(rng: &mut StdRng, bet: f64, buy_feature: bool, enhanced_bet: bool, award: u32) -> Spin {
    let area = roll_grid(rng, enhanced_bet);
    let paylines = evaluate(&area, bet);
    let mut payout = line_total(&paylines);
    let freespin = if buy_feature || scatter_count(&area) >= SCATTER_TRIGGER {
        let batch = free_spin_batch(rng, bet, award);
        payout += batch
            .total_win
            .as_ref()
            .and_then(|total| total.to_f64().ok())
            .unwrap_or(0.0);
        Some(batch)
    } else {
        None
    };
    Spin {
        slot: RawSlot {
            area,
            paylines,
            freespin,
            free_spin: None,
        },
        payout: cents(payout),
    }
}
