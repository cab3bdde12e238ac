//! relay-core
//!
//! Chat-platform ⇄ AI agent relay: task lifecycle, background dispatch and
//! result delivery.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, task, message, outbound, errors, events, retry）
//! - **ports**: 抽象化レイヤー（TaskStore, DedupFilter, RoutingPolicy, AgentClient, MessageSender, など）
//! - **app**: アプリケーションロジック（builder, relay, dispatcher, delivery, sweeper）
//! - **impls**: 実装（インメモリストア、CodeBuddy / DingTalk クライアント）
//! - **format**: Markdown 判定・変換とメッセージ分割
//! - **config**: TOML 設定と環境変数

pub mod app;
pub mod config;
pub mod domain;
pub mod format;
pub mod impls;
pub mod ports;

#[cfg(test)]
mod testing;
