//! RoutingPolicy port - fast / slow の振り分け
//!
//! 純粋関数として設計されます（副作用なし）。ヒューリスティックなので
//! 差し替え可能にしておく。

use crate::domain::Route;

/// Classifies a prompt as fast-path or slow-path.
///
/// A false "fast" risks a webhook timeout; a false "slow" only costs latency.
pub trait RoutingPolicy: Send + Sync {
    fn classify(&self, prompt: &str) -> Route;
}
