//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: タスクの正本（プロセスメモリ）
//! - **InMemoryDedupFilter**: 受信イベントの重複排除
//! - **KeywordRoutingPolicy**: キーワードによる fast / slow 判定
//! - **BroadcastEventSink**: タスクイベントの配信
//! - **CodeBuddyClient**: AI エージェント API
//! - **DingTalkClient**: 返信・能動プッシュ・画像ダウンロード

pub mod codebuddy;
pub mod dingtalk;
pub mod event_sink;
pub mod inmem_dedup;
pub mod inmem_task_store;
pub mod keyword_routing;

pub use self::codebuddy::{CodeBuddyClient, CodeBuddyOptions};
pub use self::dingtalk::{DingTalkClient, DingTalkOptions};
pub use self::event_sink::BroadcastEventSink;
pub use self::inmem_dedup::InMemoryDedupFilter;
pub use self::inmem_task_store::InMemoryTaskStore;
pub use self::keyword_routing::{DEFAULT_SLOW_KEYWORDS, KeywordRoutingPolicy};
