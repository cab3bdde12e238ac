//! DedupFilter port - 再配送イベントの排除
//!
//! 上流はネットワーク再試行時に同じイベントを再送することがある。
//! 誤検知（新しいメッセージを重複扱い）は絶対に起きてはならないので、
//! 判定は確率的構造ではなく厳密な集合で行う。

/// Rejects inbound events that were already seen.
pub trait DedupFilter: Send + Sync {
    /// `false` on first sight (and records the id), `true` on every repeat.
    fn seen(&self, event_id: &str) -> bool;

    /// Number of ids currently retained.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
