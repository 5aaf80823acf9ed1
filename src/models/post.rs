//! Post model (a single message inside a thread)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Vars;

/// A post fetched from a remote board.
///
/// Posts are transient: they live inside their owning [`Thread`] only for as
/// long as the thread is displayed, and are never persisted locally.
///
/// [`Thread`]: super::Thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Protocol-assigned id, opaque to the core
    pub id: String,
    /// Author handle/username
    pub author: String,
    /// Post body as delivered by the remote protocol (may contain markup)
    pub text: String,
    /// Parsed timestamp, when the remote value was parseable
    pub timestamp: Option<DateTime<Utc>>,
    /// Raw timestamp text from the remote protocol, kept verbatim so the
    /// original value survives a failed parse
    pub dateline: String,
    /// Author avatar URL
    pub icon_url: Option<String>,
    /// Position of the post within its thread (1-based, -1 when unknown)
    pub index: i32,
    /// Id of the owning thread
    pub thread_id: Option<String>,
    /// Owning board. Assigned by the board when results arrive; the parser
    /// has no concept of a board.
    pub board: Option<Uuid>,
    /// Protocol-specific metadata
    pub vars: Vars,
}

impl Post {
    /// Create a new post with the given protocol id
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            author: String::new(),
            text: String::new(),
            timestamp: None,
            dateline: String::new(),
            icon_url: None,
            index: -1,
            thread_id: None,
            board: None,
            vars: Vars::new(),
        }
    }

    /// Post body with markup tags stripped
    pub fn plain_text(&self) -> String {
        let tags = regex_lite::Regex::new("<[^>]*>").expect("valid pattern");
        tags.replace_all(&self.text, "").into_owned()
    }

    /// Human-readable timestamp: the parsed value formatted, or the raw
    /// remote dateline when parsing failed
    pub fn display_timestamp(&self) -> String {
        match self.timestamp {
            Some(ts) => ts.format("%b %-d, %Y %H:%M").to_string(),
            None => self.dateline.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_strips_tags() {
        let mut post = Post::new("p1");
        post.text = "<b>hello</b> <a href=\"x\">world</a>".to_string();
        assert_eq!(post.plain_text(), "hello world");
    }

    #[test]
    fn test_display_timestamp_falls_back_to_dateline() {
        let mut post = Post::new("p2");
        post.dateline = "yesterday, 3:41 PM".to_string();
        assert_eq!(post.display_timestamp(), "yesterday, 3:41 PM");
    }
}
