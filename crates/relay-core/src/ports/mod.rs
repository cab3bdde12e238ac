//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（チャットプラットフォーム、AI エージェント API）や
//! 共有状態（タスクストア、重複排除）へのインターフェースを提供し、
//! 実装の詳細を隠蔽します。

pub mod agent;
pub mod clock;
pub mod dedup;
pub mod event_sink;
pub mod id_generator;
pub mod image;
pub mod routing;
pub mod sender;
pub mod task_store;

pub use self::agent::AgentClient;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dedup::DedupFilter;
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::image::{ImageResolution, ImageResolver};
pub use self::routing::RoutingPolicy;
pub use self::sender::MessageSender;
pub use self::task_store::{TaskCounts, TaskStore};
