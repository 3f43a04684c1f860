use serde::Serialize;

/// Session flags shared by the client and its observers.
///
/// Held by the [crate::Client] and changed only through its setters, so a spin
/// classifies itself against one consistent copy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// A server-granted free-round bank is being played.
    pub in_free_round: bool,
    /// Reel-triggered bonus (free spins) is being played.
    pub bonus_active: bool,
}
