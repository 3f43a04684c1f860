//! Types shared between the slotfront backend client and the local simulator.
//!
//! [outcome] and [session] hold the canonical shapes the rest of the workspace
//! works with. [wire] is the only place that knows how the game server actually
//! spells things; everything crossing the network goes through it.

pub mod outcome;
pub mod session;
pub mod wire;

pub use outcome::{FreeSpinBatch, FreeSpinItem, Payline, PlaybackPosition, SpinOutcome};
pub use session::{FreeRoundGrant, HistoryPage, HistoryRow, SessionInit, TokenGrant};
pub use wire::ShapeError;

/// Persisted key holding the session token.
pub const TOKEN_KEY: &str = "token";
/// Persisted key holding `"true"`/`"false"` for demo mode.
pub const DEMO_KEY: &str = "demo";
/// Persisted key holding the operator lobby URL to return to.
pub const EXIT_URL_KEY: &str = "exit_url";
/// Persisted key holding the launch device hint.
pub const DEVICE_KEY: &str = "what_device";

/// Substring (lowercase) the server uses when a free-round bank is empty.
pub const NO_VALID_FREESPINS: &str = "no valid freespins";
