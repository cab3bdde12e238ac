//! Format - 返信テキストの整形と分割
//!
//! 純粋関数のみ（I/O なし）。

pub mod markdown;
pub mod split;

pub use self::markdown::{convert_to_markdown, is_markdown};
pub use self::split::{MAX_MESSAGE_LENGTH, split_content};
