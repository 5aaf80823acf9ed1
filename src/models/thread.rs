//! Thread model (a topic inside a forum, with its paged posts)

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PER_PAGE_DEFAULT, Post, Vars};

/// A thread fetched from a remote forum.
///
/// Threads are transient by design: every thread-list fetch produces fresh
/// objects, and the owning forum discards them with an explicit
/// [`Forum::clear_threads`] when the user navigates away. Nothing here is
/// persisted locally.
///
/// [`Forum::clear_threads`]: super::Forum::clear_threads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Protocol-assigned id, opaque to the core
    pub id: String,
    /// Thread title
    pub title: String,
    /// Author of the opening post
    pub author: String,
    /// Short excerpt of the opening post, as provided by the protocol
    pub preview_text: String,
    /// Pinned to the top of its forum
    pub sticky: bool,
    /// Accepting replies
    pub open: bool,
    /// Number of replies reported by the server
    pub reply_count: u32,
    /// Number of views reported by the server
    pub view_count: u32,
    /// Current page of posts (1-based)
    pub page_number: u32,
    /// Total number of post pages
    pub page_count: u32,
    /// Posts per page
    pub per_page: u32,
    /// Whether the thread has posts the user has not seen
    pub has_unread: bool,
    /// Id of the first unread post, when the protocol reports one
    pub first_unread_id: Option<String>,
    /// Posts for the current page
    pub posts: Vec<Post>,
    /// Id of the owning forum
    pub forum_id: Option<String>,
    /// Owning board, assigned by the board when results arrive
    pub board: Option<Uuid>,
    /// Protocol-specific metadata
    pub vars: Vars,
}

impl Thread {
    /// Create a new thread with the given protocol id
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: String::new(),
            author: String::new(),
            preview_text: String::new(),
            sticky: false,
            open: true,
            reply_count: 0,
            view_count: 0,
            page_number: 1,
            page_count: 1,
            per_page: PER_PAGE_DEFAULT,
            has_unread: false,
            first_unread_id: None,
            posts: Vec::new(),
            forum_id: None,
            board: None,
            vars: Vars::new(),
        }
    }

    /// Whether the current page is the last page of posts
    pub fn is_last_page(&self) -> bool {
        self.page_number >= self.page_count
    }

    /// Short preview of the thread for list display
    pub fn preview(&self, max_len: usize) -> String {
        let text = self.preview_text.replace('\n', " ");
        if text.len() <= max_len {
            text
        } else {
            format!("{}...", &text[..max_len.saturating_sub(3)])
        }
    }

    /// Discard the current page of posts
    pub fn clear_posts(&mut self) {
        self.posts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_page() {
        let mut thread = Thread::new("t1");
        thread.page_number = 1;
        thread.page_count = 3;
        assert!(!thread.is_last_page());

        thread.page_number = 3;
        assert!(thread.is_last_page());
    }

    #[test]
    fn test_preview_truncates() {
        let mut thread = Thread::new("t2");
        thread.preview_text = "a very long preview\nwith a newline".to_string();
        assert_eq!(thread.preview(12), "a very lo...");
        assert_eq!(thread.preview(200), "a very long preview with a newline");
    }
}
