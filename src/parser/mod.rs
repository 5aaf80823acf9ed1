//! Protocol adapter contract
//!
//! A parser is the seam between the core and one family of remote forum
//! software. The core depends only on the capability set below; concrete
//! adapters are registered by protocol name and bound to boards one at a
//! time.

pub mod demo;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::models::{Forum, Post, ROOT_FORUM_ID, Thread, Vars};

/// Login credentials handed to an adapter
#[derive(Debug, Clone, Default)]
pub struct LoginInfo {
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

/// A protocol or network failure reported by an adapter.
///
/// These never cross the async boundary as panics; boards forward them to
/// observers verbatim, since remediation (retry UI, credential re-entry) is
/// the consumer's concern.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParserError {
    /// Human-readable description
    pub message: String,
    /// Optional protocol-level detail (response body, status line)
    pub details: Option<String>,
}

impl ParserError {
    /// Build an error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Attach protocol-level detail
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Result alias for adapter operations
pub type ParserResult<T> = std::result::Result<T, ParserError>;

/// Request modifier flags, combined bitwise
pub type RequestOptions = u32;

/// Default request behavior
pub const REQUEST_DEFAULT: RequestOptions = 0x0000;
/// Bypass any adapter-side caching
pub const REQUEST_NO_CACHE: RequestOptions = 0x0001;
/// Skip adapter-side markup cleanup
pub const REQUEST_NO_TIDY: RequestOptions = 0x0002;

/// Which post a post-list request should land on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostListOption {
    /// Open at the first post the user has not read
    #[default]
    FirstUnread,
    /// Open at the first post of the thread
    FirstPost,
    /// Open at the most recent post
    LastPost,
}

impl PostListOption {
    /// Stable string form, as stored in a board's options
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstUnread => "firstunread",
            Self::FirstPost => "firstpost",
            Self::LastPost => "lastpost",
        }
    }
}

impl FromStr for PostListOption {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "firstunread" => Ok(Self::FirstUnread),
            "firstpost" => Ok(Self::FirstPost),
            "lastpost" => Ok(Self::LastPost),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PostListOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The capability contract every protocol adapter implements.
///
/// All data-fetching operations are async; the board issues a request and
/// resumes in a completion handler, never blocking a thread on network I/O.
/// There is no cancellation primitive: an in-flight request can only have
/// its result ignored.
#[async_trait]
pub trait Parser: Send + Sync {
    /// Protocol name, persisted in the board's `parser` column
    fn name(&self) -> &str;

    /// Id of the remote root forum
    fn root_forum_id(&self) -> String {
        ROOT_FORUM_ID.to_string()
    }

    /// Authenticate. The returned bag carries a `success` flag plus any
    /// protocol-specific fields (session tokens, failure reasons).
    async fn login(&self, info: &LoginInfo) -> ParserResult<Vars>;

    /// Immediate children of the given forum. Used by the crawl.
    async fn forum_list(&self, parent_id: &str) -> ParserResult<Vec<Forum>>;

    /// Fetch a page of threads; the forum is echoed back with `threads`
    /// and paging populated.
    async fn thread_list(&self, forum: Forum, options: RequestOptions) -> ParserResult<Forum>;

    /// Fetch a page of posts; the thread is echoed back with `posts`
    /// and paging populated.
    async fn post_list(
        &self,
        thread: Thread,
        view: PostListOption,
        options: RequestOptions,
    ) -> ParserResult<Thread>;

    /// Submit a new thread; the echoed thread carries its assigned id
    async fn submit_thread(&self, thread: Thread) -> ParserResult<Thread>;

    /// Submit a new post; the echoed post carries its assigned id
    async fn submit_post(&self, post: Post) -> ParserResult<Post>;

    /// Mark every thread in the forum read on the server
    async fn mark_forum_read(&self, forum: &Forum) -> ParserResult<Forum>;

    /// Flat list of forums currently holding unread content
    async fn unread_forums(&self) -> ParserResult<Vec<Forum>>;

    /// Independent handle onto the same remote board, for side crawls that
    /// must not disturb the bound adapter's state
    fn clone_parser(&self) -> Box<dyn Parser>;
}

/// Factory closure producing an adapter for a service URL
pub type ParserFactory = Box<dyn Fn(&str) -> Result<Box<dyn Parser>> + Send + Sync>;

/// Registry of protocol adapters, keyed by protocol name.
///
/// Explicitly constructed and passed to whatever needs it; there is no
/// process-global registry.
pub struct ParserRegistry {
    factories: HashMap<String, ParserFactory>,
}

impl ParserRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the built-in adapters registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(demo::PROTOCOL_NAME, |service_url| {
            let parser: Box<dyn Parser> = Box::new(demo::DemoParser::sample(service_url));
            Ok(parser)
        });
        registry
    }

    /// Register a factory for a protocol name
    pub fn register<F>(&mut self, protocol: &str, factory: F)
    where
        F: Fn(&str) -> Result<Box<dyn Parser>> + Send + Sync + 'static,
    {
        self.factories
            .insert(protocol.to_string(), Box::new(factory));
    }

    /// Instantiate an adapter for `protocol` against `service_url`
    pub fn create(&self, protocol: &str, service_url: &str) -> Result<Arc<dyn Parser>> {
        let factory = self
            .factories
            .get(protocol)
            .ok_or_else(|| Error::UnknownProtocol(protocol.to_string()))?;

        factory(service_url).map(Arc::from)
    }

    /// Registered protocol names, sorted
    pub fn protocols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
