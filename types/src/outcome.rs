use serde::{Deserialize, Serialize};

/// One evaluated payline of a spin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payline {
    pub line_id: u32,
    pub symbol: u32,
    pub count: u32,
    pub win: f64,
}

/// One pre-computed spin inside a free-spin batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FreeSpinItem {
    pub grid: Vec<Vec<u32>>,
    pub paylines: Vec<Payline>,
    pub sub_total_win: f64,
    /// Spins remaining in the batch including this one. Zero or less means the
    /// item is not playable.
    pub spins_left: i64,
}

/// Reel-triggered free spins awarded by a single spin response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FreeSpinBatch {
    pub total: u32,
    pub used: u32,
    pub remaining: u32,
    pub total_win: f64,
    pub items: Vec<FreeSpinItem>,
}

/// Where a synthetic outcome sits inside the batch it was built from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPosition {
    pub index: usize,
    pub spins_left: i64,
    pub sub_total_win: f64,
}

/// Normalized result of one spin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpinOutcome {
    pub player_id: Option<String>,
    pub bet: f64,
    pub grid: Vec<Vec<u32>>,
    pub paylines: Vec<Payline>,
    pub free_spins: Option<FreeSpinBatch>,
    /// Free-round bank remaining as reported by the server (`fsCount`).
    pub free_round_remaining: Option<u32>,
    /// Set only on outcomes replayed from a free-spin item.
    pub playback: Option<PlaybackPosition>,
}

impl SpinOutcome {
    /// Sum of all payline wins.
    pub fn total_win(&self) -> f64 {
        self.paylines.iter().map(|line| line.win).sum()
    }

    pub fn has_free_spins(&self) -> bool {
        self.free_spins.is_some()
    }

    /// Build the outcome for item `index` of this outcome's free-spin batch.
    ///
    /// The batch (aggregates and items) is carried over unchanged so the
    /// result can serve as the cached outcome for the next item.
    pub fn from_free_spin_item(&self, index: usize) -> Option<SpinOutcome> {
        let batch = self.free_spins.as_ref()?;
        let item = batch.items.get(index)?;
        Some(SpinOutcome {
            player_id: self.player_id.clone(),
            bet: self.bet,
            grid: item.grid.clone(),
            paylines: item.paylines.clone(),
            free_spins: Some(batch.clone()),
            free_round_remaining: None,
            playback: Some(PlaybackPosition {
                index,
                spins_left: item.spins_left,
                sub_total_win: item.sub_total_win,
            }),
        })
    }
}
