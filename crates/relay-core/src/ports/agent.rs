//! AgentClient port - リモート AI エージェント呼び出し

use std::path::Path;

use async_trait::async_trait;

/// Calls the remote agent backend.
///
/// Never fails: retries and timeouts are handled inside, and exhausted or
/// permanent errors come back as an explanatory text the user can read.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn chat(&self, prompt: &str, image_path: Option<&Path>) -> String;
}
