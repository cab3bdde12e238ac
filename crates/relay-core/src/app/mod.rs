//! App - アプリケーション層
//!
//! ports を組み合わせて中継ロジックを実装します。
//!
//! # 主要コンポーネント
//! - **RelayBuilder**: Relay の構築とワイヤリング（Fail-fast）
//! - **Relay**: 受信イベント 1 件の処理（重複排除 → 前処理 → ルーティング）
//! - **Dispatcher**: slow path のバックグラウンド実行
//! - **ResultDelivery**: 整形・分割・送信
//! - **SweepLoop**: 期限切れタスクの削除

pub mod builder;
pub mod delivery;
pub mod dispatcher;
pub mod preprocess;
pub mod relay;
pub mod signature;
pub mod sweeper;

pub use self::builder::{BuildError, RelayBuilder};
pub use self::delivery::ResultDelivery;
pub use self::dispatcher::{DEFAULT_FAILURE_TEXT, DEFAULT_WORKERS, Dispatcher, DispatcherOptions, Work};
pub use self::preprocess::{AgentRequest, Prepared, prepare};
pub use self::relay::{DEFAULT_ACK_TEXT, HandleOutcome, Relay, RelayOptions};
pub use self::sweeper::SweepLoop;
