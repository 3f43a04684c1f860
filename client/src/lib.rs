//! Client for the slot game backend.
//!
//! A [Client] owns one player session: it issues and stores the session
//! token, initializes the session (picking up any free-round grant), reports
//! the balance and requests spins. The last spin is cached so reel-triggered
//! free spins can be played back one item at a time. Session events go out on
//! a [NotificationBus]; the [FreeRoundLedger] and [WinMeter] are two of its
//! subscribers.

pub mod bus;
pub mod client;
pub mod ledger;
pub mod spin;
pub mod state;
pub mod store;
pub mod win;

pub use bus::{Notification, NotificationBus, Subscription, Topic};
pub use client::{Client, ClientConfig, OperatorConfig};
pub use ledger::{FreeRoundLedger, FreeRoundStatus};
pub use spin::{SpinKind, SpinRequest};
pub use state::SessionState;
pub use store::{FileStore, KeyValueStore, LaunchParams, MemoryStore, SessionStore};
pub use win::{WinMeter, WinTotals};
use slotfront_types::ShapeError;
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
    #[error("token request failed: {status}: {body}")]
    Network {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("no session token")]
    AuthRequired,
    #[error("session rejected: {status}: {body}")]
    Unauthorized {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("spin failed: {status}: {body}")]
    SpinRequestFailed {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unexpected response: {0}")]
    UnexpectedResponse(#[from] ShapeError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no free-spin data in the cached outcome")]
    NoFreeSpinData,
    #[error("no more free spins in the current batch")]
    NoMoreFreeSpins,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
