use serde::{Deserialize, Serialize};

/// Which path an inbound request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Call the agent inside the callback and reply on the session webhook.
    Fast,
    /// Acknowledge now, run in the background, push the result later.
    Slow,
}
