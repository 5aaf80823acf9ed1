//! Board aggregate
//!
//! A board is one configured connection to a remote forum: credentials, a
//! protocol adapter, and the cached forum tree. It orchestrates crawl,
//! update, and request operations against the adapter contract and reports
//! results to observers as [`BoardEvent`]s.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::{BoardEvent, Subscribers};
use crate::models::{Forum, ForumType, PER_PAGE_DEFAULT, Post, Thread, Vars};
use crate::parser::{
    LoginInfo, Parser, ParserError, ParserRegistry, ParserResult, PostListOption, RequestOptions,
};

/// Seconds between background refresh cycles when a board has no
/// `refreshRate` option
pub const DEFAULT_REFRESH_RATE: u64 = 600;

/// Connection state of a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoardStatus {
    /// Not logged in
    #[default]
    Offline,
    /// Logged in and usable
    Online,
    /// Adapter instantiation failed; only a fresh login attempt leaves
    /// this state
    Err,
}

impl std::fmt::Display for BoardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Err => "error",
        };
        write!(f, "{s}")
    }
}

/// The outcome of one in-flight adapter request
enum Completion {
    Login(ParserResult<Vars>),
    ThreadList(ParserResult<Forum>),
    PostList(ParserResult<Thread>),
    NewThread(ParserResult<Thread>),
    NewPost(ParserResult<Post>),
    MarkedRead(ParserResult<Forum>),
}

/// A completion stamped with the adapter binding it belongs to
struct TaggedCompletion {
    generation: u64,
    completion: Completion,
}

/// One configured connection to a remote forum
pub struct Board {
    db_id: i64,
    uuid: Uuid,
    /// Display name
    pub name: String,
    /// Site URL
    pub url: String,
    service_url: String,
    /// Login username
    pub username: String,
    /// Login password
    pub password: String,
    /// Protocol name used to instantiate the adapter
    pub protocol: String,
    /// Whether the board participates in background refresh
    pub enabled: bool,
    /// Log in automatically at startup
    pub auto_login: bool,
    /// Base64-encoded favicon buffer
    pub icon: Option<String>,
    options: Vars,
    status: BoardStatus,
    last_update: DateTime<Utc>,
    has_unread: bool,
    root: Option<Forum>,
    /// forum id -> child-index path from the root; the only sanctioned
    /// id-lookup route
    forum_hash: HashMap<String, Vec<usize>>,
    current_forum: Option<String>,
    current_thread: Option<String>,
    parser: Option<Arc<dyn Parser>>,
    generation: u64,
    subscribers: Subscribers<BoardEvent>,
    completion_tx: UnboundedSender<TaggedCompletion>,
    completion_rx: UnboundedReceiver<TaggedCompletion>,
}

impl Board {
    /// Option key: seconds between background refresh cycles
    pub const OPT_REFRESH_RATE: &'static str = "refreshRate";
    /// Option key: threads fetched per page
    pub const OPT_THREADS_PER_PAGE: &'static str = "threadsPerPage";
    /// Option key: posts fetched per page
    pub const OPT_POSTS_PER_PAGE: &'static str = "postsPerPage";
    /// Option key: position in the board list
    pub const OPT_DISPLAY_ORDER: &'static str = "displayOrder";
    /// Option key: id of the remote root forum
    pub const OPT_ROOT_ID: &'static str = "rootId";
    /// Option key: last forum the user had open
    pub const OPT_LAST_FORUM_ID: &'static str = "lastForumId";
    /// Option key: show images in post bodies
    pub const OPT_SHOW_IMAGES: &'static str = "showImages";
    /// Option key: which post a post-list request lands on
    pub const OPT_POST_LIST_ACTION: &'static str = "postListAction";
    /// Option key: use a custom user-agent
    pub const OPT_USE_USER_AGENT: &'static str = "web.customagent.enabled";
    /// Option key: the custom user-agent value
    pub const OPT_USER_AGENT: &'static str = "web.customagent.value";
    /// Option key: encrypt the stored password
    pub const OPT_USE_ENCRYPTION: &'static str = "encryption.enabled";
    /// Option key: encryption seed
    pub const OPT_ENC_SEED: &'static str = "encryption.seed";
    /// Option key: encryption key reference
    pub const OPT_ENC_KEY: &'static str = "encryption.key";

    /// Create a board for the given site URL
    pub fn new(url: &str) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        Self {
            db_id: -1,
            uuid: Uuid::new_v4(),
            name: String::new(),
            url: url.to_string(),
            service_url: String::new(),
            username: String::new(),
            password: String::new(),
            protocol: String::new(),
            enabled: true,
            auto_login: false,
            icon: None,
            options: Vars::new(),
            status: BoardStatus::Offline,
            last_update: Utc::now(),
            has_unread: false,
            root: None,
            forum_hash: HashMap::new(),
            current_forum: None,
            current_thread: None,
            parser: None,
            generation: 0,
            subscribers: Subscribers::new(),
            completion_tx,
            completion_rx,
        }
    }

    // ==================== Properties ====================

    /// Local database row id; -1 until persisted
    pub fn db_id(&self) -> i64 {
        self.db_id
    }

    pub(crate) fn set_db_id(&mut self, db_id: i64) {
        self.db_id = db_id;
    }

    /// Stable cross-session identity, distinct from the database row id
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub(crate) fn set_uuid(&mut self, uuid: Uuid) {
        self.uuid = uuid;
    }

    /// Connection state
    pub fn status(&self) -> BoardStatus {
        self.status
    }

    /// Force the connection state
    pub fn set_status(&mut self, status: BoardStatus) {
        self.status = status;
    }

    /// When the stored structure was last verified against the server
    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Stamp the structure-verification time
    pub fn set_last_update(&mut self, when: DateTime<Utc>) {
        self.last_update = when;
    }

    /// Whether any forum holds unread content, per the last refresh
    pub fn has_unread(&self) -> bool {
        self.has_unread
    }

    /// The service endpoint, falling back to the site URL when unset
    pub fn service_url(&self) -> &str {
        if self.service_url.trim().is_empty() {
            &self.url
        } else {
            &self.service_url
        }
    }

    /// Set the service endpoint
    pub fn set_service_url(&mut self, service_url: &str) {
        self.service_url = service_url.to_string();
    }

    /// The board's option bag
    pub fn options(&self) -> &Vars {
        &self.options
    }

    /// Mutable access to the option bag
    pub fn options_mut(&mut self) -> &mut Vars {
        &mut self.options
    }

    /// Position in the board list
    pub fn display_order(&self) -> u32 {
        self.options.get_parsed(Self::OPT_DISPLAY_ORDER).unwrap_or(0)
    }

    /// Set the position in the board list
    pub fn set_display_order(&mut self, order: u32) {
        self.options.set(Self::OPT_DISPLAY_ORDER, order);
    }

    /// Seconds between background refresh cycles
    pub fn refresh_rate(&self) -> u64 {
        self.options
            .get_parsed(Self::OPT_REFRESH_RATE)
            .unwrap_or(DEFAULT_REFRESH_RATE)
    }

    /// The root of the cached forum tree
    pub fn root(&self) -> Option<&Forum> {
        self.root.as_ref()
    }

    /// Mutable access to the root
    pub fn root_mut(&mut self) -> Option<&mut Forum> {
        self.root.as_mut()
    }

    /// Install a forum tree (used when loading from the store). Clears and
    /// rebuilds the id index.
    pub fn set_root(&mut self, root: Forum) {
        self.forum_hash.clear();
        self.root = Some(root);
        self.update_forum_hash();
    }

    /// Id of the forum the user currently has open
    pub fn current_forum(&self) -> Option<&str> {
        self.current_forum.as_deref()
    }

    /// Id of the thread the user currently has open
    pub fn current_thread(&self) -> Option<&str> {
        self.current_thread.as_deref()
    }

    /// The id index over the live tree
    pub fn forum_hash(&self) -> &HashMap<String, Vec<usize>> {
        &self.forum_hash
    }

    // ==================== Observers ====================

    /// Register an observer; events arrive on the returned channel
    pub fn subscribe(&mut self) -> UnboundedReceiver<BoardEvent> {
        self.subscribers.subscribe()
    }

    fn emit(&mut self, event: BoardEvent) {
        self.subscribers.emit(&event);
    }

    pub(crate) fn emit_structure_changed(&mut self) {
        self.emit(BoardEvent::StructureChanged);
    }

    // ==================== Adapter binding ====================

    /// The bound adapter
    pub fn parser(&self) -> Result<&Arc<dyn Parser>> {
        self.parser
            .as_ref()
            .ok_or_else(|| Error::invalid_state(format!("no adapter bound to '{}'", self.name)))
    }

    /// An independent adapter handle for side crawls
    pub fn clone_parser(&self) -> Result<Box<dyn Parser>> {
        Ok(self.parser()?.clone_parser())
    }

    /// Bind an adapter, replacing any previous one.
    ///
    /// Completions from the previous binding are invalidated before the new
    /// adapter attaches, so a swap can never produce ghost callbacks.
    pub fn set_parser(&mut self, parser: Arc<dyn Parser>) {
        if let Some(existing) = &self.parser {
            if Arc::ptr_eq(existing, &parser) {
                return;
            }
            self.generation += 1;
        }

        self.protocol = parser.name().to_string();
        self.parser = Some(parser);
    }

    /// Instantiate and bind the adapter named by the board's protocol.
    /// Failure puts the board into the error state.
    pub fn connect(&mut self, registry: &ParserRegistry) -> Result<()> {
        let service_url = self.service_url().to_string();

        match registry.create(&self.protocol, &service_url) {
            Ok(parser) => {
                self.set_parser(parser);
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    "could not instantiate adapter '{}' for '{}': {e}",
                    self.protocol,
                    self.name
                );
                self.status = BoardStatus::Err;
                Err(e)
            }
        }
    }

    // ==================== Requests ====================

    fn submit<F>(&self, request: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.completion_tx.clone();
        let generation = self.generation;

        tokio::spawn(async move {
            let completion = request.await;
            let _ = tx.send(TaggedCompletion {
                generation,
                completion,
            });
        });
    }

    /// Attempt to log in with the board's credentials. The outcome arrives
    /// as a [`BoardEvent::Login`].
    pub fn login(&mut self) -> Result<()> {
        let parser = self.parser()?.clone();
        let info = LoginInfo {
            username: self.username.clone(),
            password: self.password.clone(),
        };

        self.submit(async move { Completion::Login(parser.login(&info).await) });
        Ok(())
    }

    /// Request a page of threads for a forum. Sets the current-forum
    /// cursor and applies the board's per-page option.
    pub fn request_thread_list(&mut self, forum: &Forum, options: RequestOptions) -> Result<()> {
        let parser = self.parser()?.clone();
        self.current_forum = Some(forum.id.clone());

        let mut forum = forum.clone();
        forum.per_page = self
            .options
            .get_parsed(Self::OPT_THREADS_PER_PAGE)
            .unwrap_or(PER_PAGE_DEFAULT);

        self.submit(async move { Completion::ThreadList(parser.thread_list(forum, options).await) });
        Ok(())
    }

    /// Request a page of posts for a thread. Sets the current-thread
    /// cursor and applies the board's per-page option. `force_first_page`
    /// overrides the saved landing preference; it is used when paginating
    /// explicitly rather than navigating in from the thread list.
    pub fn request_post_list(
        &mut self,
        thread: &Thread,
        options: RequestOptions,
        force_first_page: bool,
    ) -> Result<()> {
        let parser = self.parser()?.clone();
        self.current_thread = Some(thread.id.clone());

        let mut thread = thread.clone();
        thread.per_page = self
            .options
            .get_parsed(Self::OPT_POSTS_PER_PAGE)
            .unwrap_or(PER_PAGE_DEFAULT);

        let view = if force_first_page {
            PostListOption::FirstPost
        } else {
            self.options
                .get_parsed(Self::OPT_POST_LIST_ACTION)
                .unwrap_or_default()
        };

        self.submit(
            async move { Completion::PostList(parser.post_list(thread, view, options).await) },
        );
        Ok(())
    }

    /// Submit a new thread to the server
    pub fn submit_new_thread(&mut self, thread: Thread) -> Result<()> {
        let parser = self.parser()?.clone();
        self.submit(async move { Completion::NewThread(parser.submit_thread(thread).await) });
        Ok(())
    }

    /// Submit a new post to the server
    pub fn submit_new_post(&mut self, post: Post) -> Result<()> {
        let parser = self.parser()?.clone();
        self.submit(async move { Completion::NewPost(parser.submit_post(post).await) });
        Ok(())
    }

    /// Ask the server to mark every thread in the forum read
    pub fn mark_forum_read(&mut self, forum: &Forum) -> Result<()> {
        let parser = self.parser()?.clone();
        let forum = forum.clone();
        self.submit(async move { Completion::MarkedRead(parser.mark_forum_read(&forum).await) });
        Ok(())
    }

    /// Wait for the next completion and dispatch it. Returns false when no
    /// request can ever complete again.
    pub async fn process_completion(&mut self) -> bool {
        match self.completion_rx.recv().await {
            Some(tagged) => {
                self.dispatch(tagged);
                true
            }
            None => false,
        }
    }

    /// Dispatch every completion that has already arrived
    pub fn pump_completions(&mut self) -> usize {
        let mut pending = Vec::new();
        while let Ok(tagged) = self.completion_rx.try_recv() {
            pending.push(tagged);
        }

        let count = pending.len();
        for tagged in pending {
            self.dispatch(tagged);
        }
        count
    }

    fn dispatch(&mut self, tagged: TaggedCompletion) {
        if tagged.generation != self.generation {
            tracing::debug!(
                "dropping completion from a detached adapter binding on '{}'",
                self.name
            );
            return;
        }

        match tagged.completion {
            Completion::Login(Ok(params)) => self.on_login(params),
            Completion::ThreadList(Ok(forum)) => self.on_thread_list(forum),
            Completion::PostList(Ok(thread)) => self.on_post_list(thread),
            Completion::NewThread(Ok(thread)) => self.on_new_thread(thread),
            Completion::NewPost(Ok(post)) => self.on_new_post(post),
            Completion::MarkedRead(Ok(forum)) => self.on_marked_forum_read(forum),
            Completion::Login(Err(e))
            | Completion::ThreadList(Err(e))
            | Completion::PostList(Err(e))
            | Completion::NewThread(Err(e))
            | Completion::NewPost(Err(e))
            | Completion::MarkedRead(Err(e)) => self.on_request_error(e),
        }
    }

    // ==================== Completion handlers ====================

    /// A login attempt finished; transition state and notify observers
    pub fn on_login(&mut self, params: Vars) {
        if params.get_bool("success") {
            self.status = BoardStatus::Online;
        }

        self.emit(BoardEvent::Login { params });
    }

    /// A forum list arrived outside of a crawl
    pub fn on_forum_list(&mut self, mut forums: Vec<Forum>) {
        for forum in &mut forums {
            forum.board = Some(self.uuid);
        }

        self.emit(BoardEvent::ForumList { forums });
    }

    /// A thread list arrived. A result for a forum the user has since
    /// navigated away from is still delivered, flagged non-matching; the
    /// cursor is never overwritten by a stale result.
    pub fn on_thread_list(&mut self, mut forum: Forum) {
        let matches_current = self.current_forum.as_deref() == Some(forum.id.as_str());
        if !matches_current {
            tracing::warn!(
                "thread list arrived for forum '{}' which is no longer current",
                forum.id
            );
        }

        forum.board = Some(self.uuid);
        // the adapter has no concept of a board
        for thread in &mut forum.threads {
            thread.board = Some(self.uuid);
        }

        self.emit(BoardEvent::ThreadList {
            forum,
            matches_current,
        });
    }

    /// A post list arrived. Viewing the last page of a current thread
    /// counts as having read it, independent of server acknowledgment.
    pub fn on_post_list(&mut self, mut thread: Thread) {
        let matches_current = self.current_thread.as_deref() == Some(thread.id.as_str());
        if !matches_current {
            tracing::warn!(
                "post list arrived for thread '{}' which is no longer current",
                thread.id
            );
        }

        thread.board = Some(self.uuid);
        for post in &mut thread.posts {
            post.board = Some(self.uuid);
        }

        if matches_current && thread.is_last_page() {
            thread.has_unread = false;
        }

        self.emit(BoardEvent::PostList {
            thread,
            matches_current,
        });
    }

    /// The unread-forum list was refreshed
    pub fn on_unread_forums(&mut self, forums: Vec<Forum>) {
        self.has_unread = !forums.is_empty();
        self.emit(BoardEvent::UnreadForums { forums });
    }

    /// The server acknowledged a mark-read request
    pub fn on_marked_forum_read(&mut self, forum: Forum) {
        if let Some(node) = self.forum_mut(&forum.id) {
            node.has_unread = false;
        }

        self.emit(BoardEvent::ForumMarkedRead { forum });
    }

    /// A submitted thread was accepted
    pub fn on_new_thread(&mut self, mut thread: Thread) {
        thread.board = Some(self.uuid);
        self.emit(BoardEvent::NewThread { thread });
    }

    /// A submitted post was accepted
    pub fn on_new_post(&mut self, mut post: Post) {
        post.board = Some(self.uuid);
        self.emit(BoardEvent::NewPost { post });
    }

    /// A request failed; forward the payload to observers
    pub fn on_request_error(&mut self, error: ParserError) {
        self.emit(BoardEvent::RequestError { error });
    }

    // ==================== Crawl ====================

    /// Build the forum tree from scratch.
    ///
    /// Fetches the root's children and recursively crawls every non-Link
    /// branch. A duplicate-guard list of visited ids is threaded through
    /// the recursion so each forum id is crawled at most once, even when
    /// the server reports a forum under more than one parent; Link ids
    /// enter the guard list without being recursed into. Per-branch errors
    /// are logged and skipped unless `strict`, in which case the crawl
    /// aborts and the root is reset to empty.
    ///
    /// Returns the guard list.
    pub async fn crawl_root(&mut self, strict: bool) -> Result<Vec<String>> {
        let parser = self.parser()?.clone();

        self.root = None;
        self.forum_hash.clear();

        let mut dup_list = Vec::new();
        match Self::crawl_tree(parser.as_ref(), &mut dup_list, strict).await {
            Ok(mut root) => {
                Self::stamp_board(&mut root, self.uuid);
                self.options.set(Self::OPT_ROOT_ID, root.id.clone());
                self.root = Some(root);
                self.update_forum_hash();
                Ok(dup_list)
            }
            Err(e) => {
                tracing::error!("crawl of '{}' failed: {e}", self.url);
                if strict { Err(e) } else { Ok(dup_list) }
            }
        }
    }

    /// Fetch the server's current structure into a detached tree without
    /// touching the live one. Used by the periodic drift check.
    pub async fn get_root_structure(&self, strict: bool) -> Result<Forum> {
        let parser = self.parser()?.clone();

        let mut dup_list = Vec::new();
        match Self::crawl_tree(parser.as_ref(), &mut dup_list, strict).await {
            Ok(root) => Ok(root),
            Err(e) => {
                tracing::error!("structure fetch for '{}' failed: {e}", self.url);
                if strict {
                    Err(e)
                } else {
                    Ok(Forum::root(&parser.root_forum_id()))
                }
            }
        }
    }

    async fn crawl_tree(
        parser: &dyn Parser,
        dup_list: &mut Vec<String>,
        strict: bool,
    ) -> Result<Forum> {
        let mut root = Forum::root(&parser.root_forum_id());
        let list = parser.forum_list(&root.id).await.map_err(Error::from)?;

        for forum in list {
            let child = root.add_child(forum)?;
            let first_visit = !dup_list.contains(&child.id);
            if first_visit {
                dup_list.push(child.id.clone());
            }

            if first_visit && child.forum_type != ForumType::Link {
                tracing::debug!("crawling root forum '{}' ({})", child.name, child.id);

                if let Err(e) = Self::crawl_sub_forum(parser, child, dup_list).await {
                    if strict {
                        return Err(e);
                    }
                    tracing::warn!("adapter error: '{e}'");
                }
            }
        }

        Ok(root)
    }

    fn crawl_sub_forum<'a>(
        parser: &'a dyn Parser,
        parent: &'a mut Forum,
        dup_list: &'a mut Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let forums = parser.forum_list(&parent.id).await.map_err(Error::from)?;

            for forum in forums {
                let child = parent.add_child(forum)?;
                if !dup_list.contains(&child.id) {
                    dup_list.push(child.id.clone());

                    if child.forum_type != ForumType::Link {
                        tracing::debug!("crawling sub forum '{}' ({})", child.name, child.id);
                        Self::crawl_sub_forum(parser, child, dup_list).await?;
                    }
                }
            }

            Ok(())
        })
    }

    fn stamp_board(forum: &mut Forum, uuid: Uuid) {
        forum.board = Some(uuid);
        for child in &mut forum.children {
            Self::stamp_board(child, uuid);
        }
    }

    // ==================== Forum hash ====================

    /// Re-synchronize the id index with the live tree.
    ///
    /// Idempotent: already-indexed ids are left alone, so the index must
    /// start empty for a fresh tree; `crawl_root` clears it first. Stale
    /// entries for nodes no longer in the tree are not removed here.
    pub fn update_forum_hash(&mut self) {
        let Some(root) = self.root.take() else {
            return;
        };

        let mut path = Vec::new();
        Self::index_node(&mut self.forum_hash, &root, &mut path);
        self.root = Some(root);
    }

    fn index_node(hash: &mut HashMap<String, Vec<usize>>, node: &Forum, path: &mut Vec<usize>) {
        // every non-root node is indexed, Categories and Links included
        if !node.is_root() && !hash.contains_key(&node.id) {
            hash.insert(node.id.clone(), path.clone());
        }

        for (i, child) in node.children.iter().enumerate() {
            path.push(i);
            Self::index_node(hash, child, path);
            path.pop();
        }
    }

    /// Look up a forum by id through the index
    pub fn forum(&self, forum_id: &str) -> Option<&Forum> {
        let path = self.forum_hash.get(forum_id)?;

        let mut node = self.root.as_ref()?;
        for &idx in path {
            node = node.children.get(idx)?;
        }

        (node.id == forum_id).then_some(node)
    }

    /// Look up a forum by id, mutably
    pub fn forum_mut(&mut self, forum_id: &str) -> Option<&mut Forum> {
        let path = self.forum_hash.get(forum_id)?.clone();

        let mut node = self.root.as_mut()?;
        for idx in path {
            node = node.children.get_mut(idx)?;
        }

        if node.id == forum_id { Some(node) } else { None }
    }

    // ==================== Background refresh ====================

    /// Refresh the flat unread-forum list.
    ///
    /// Adapter failures are logged and swallowed; an unread refresh is
    /// background noise, never fatal.
    pub async fn update_unread(&mut self) {
        tracing::info!("updating unread forums for '{}'", self.name);

        self.update_forum_hash();

        let parser = match &self.parser {
            Some(p) => p.clone(),
            None => {
                tracing::warn!("no adapter bound to '{}', skipping unread refresh", self.name);
                return;
            }
        };

        match parser.unread_forums().await {
            Ok(mut forums) => {
                for forum in &mut forums {
                    forum.board = Some(self.uuid);
                }
                self.on_unread_forums(forums);
            }
            Err(e) => {
                tracing::error!("unread refresh for '{}' failed: {e}", self.name);
            }
        }
    }
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("protocol", &self.protocol)
            .field("uuid", &self.uuid)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BoardEvent;
    use crate::parser::demo::DemoParser;
    use crate::parser::REQUEST_DEFAULT;
    use std::collections::HashSet;

    fn demo_board(parser: DemoParser) -> Board {
        let mut board = Board::new("https://demo.test");
        board.name = "Demo".to_string();
        board.username = "wren".to_string();
        board.set_parser(Arc::new(parser));
        board
    }

    /// root -> Category General(1) -> Announcements(10), Off-Topic(11)
    fn scenario_parser() -> DemoParser {
        let parser = DemoParser::new("https://demo.test");
        parser.add_forum("-1", Forum::with_type("1", "General", ForumType::Category));
        parser.add_forum("1", Forum::new("10", "Announcements"));
        parser.add_forum("1", Forum::new("11", "Off-Topic"));
        parser
    }

    #[test]
    fn test_status_starts_offline() {
        let board = Board::new("https://demo.test");
        assert_eq!(board.status(), BoardStatus::Offline);
    }

    #[test]
    fn test_login_event_transitions_to_online() {
        let mut board = Board::new("https://demo.test");

        let mut params = Vars::new();
        params.set("success", true);
        board.on_login(params);

        assert_eq!(board.status(), BoardStatus::Online);
    }

    #[test]
    fn test_failed_login_leaves_status() {
        let mut board = Board::new("https://demo.test");

        let mut params = Vars::new();
        params.set("success", false);
        params.set("error", "bad credentials");
        board.on_login(params);

        assert_eq!(board.status(), BoardStatus::Offline);
    }

    #[test]
    fn test_connect_failure_sets_err_and_only_login_recovers() {
        let registry = ParserRegistry::new(); // nothing registered
        let mut board = Board::new("https://demo.test");
        board.protocol = "demo".to_string();

        assert!(board.connect(&registry).is_err());
        assert_eq!(board.status(), BoardStatus::Err);

        // unrelated events do not leave the error state
        board.on_unread_forums(Vec::new());
        assert_eq!(board.status(), BoardStatus::Err);

        // a fresh, successful login attempt is the only way out
        let mut params = Vars::new();
        params.set("success", true);
        board.on_login(params);
        assert_eq!(board.status(), BoardStatus::Online);
    }

    #[tokio::test]
    async fn test_crawl_builds_tree_and_hash() {
        let mut board = demo_board(scenario_parser());
        board.crawl_root(true).await.unwrap();

        let root = board.root().unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].children.len(), 2);

        // index-all policy: the category is hashed alongside its forums
        assert_eq!(board.forum_hash().len(), 3);
        assert_eq!(board.forum("10").unwrap().name, "Announcements");
        assert_eq!(board.forum("11").unwrap().name, "Off-Topic");
        assert_eq!(board.forum("1").unwrap().forum_type, ForumType::Category);
    }

    #[tokio::test]
    async fn test_crawl_dedups_forum_under_two_parents() {
        let parser = DemoParser::new("https://demo.test");
        parser.add_forum("-1", Forum::with_type("a", "Alpha", ForumType::Category));
        parser.add_forum("-1", Forum::with_type("b", "Beta", ForumType::Category));
        // "shared" is reported as a child of both categories
        parser.add_forum("a", Forum::new("shared", "Shared"));
        parser.add_forum("b", Forum::new("shared", "Shared"));
        parser.add_forum("shared", Forum::new("leaf", "Leaf"));

        let mut board = demo_board(parser);
        let dup_list = board.crawl_root(true).await.unwrap();

        // every visited id exactly once
        let unique: HashSet<&String> = dup_list.iter().collect();
        assert_eq!(unique.len(), dup_list.len());
        for id in ["a", "b", "shared", "leaf"] {
            assert!(dup_list.iter().any(|d| d == id), "missing {id}");
        }

        // the second occurrence was recorded but not crawled
        let root = board.root().unwrap();
        let alpha = &root.children[0];
        let beta = &root.children[1];
        assert_eq!(alpha.children[0].children.len(), 1);
        assert!(beta.children[0].children.is_empty());
    }

    #[tokio::test]
    async fn test_crawl_skips_link_branches() {
        let parser = DemoParser::new("https://demo.test");
        let mut link = Forum::with_type("20", "Elsewhere", ForumType::Link);
        link.vars.set("url", "https://elsewhere.test");
        parser.add_forum("-1", link);
        // children under the link must never be fetched
        parser.add_forum("20", Forum::new("999", "Hidden"));

        let mut board = demo_board(parser);
        let dup_list = board.crawl_root(true).await.unwrap();

        assert!(dup_list.contains(&"20".to_string()));
        assert!(!dup_list.contains(&"999".to_string()));
        assert!(board.root().unwrap().children[0].children.is_empty());
    }

    #[tokio::test]
    async fn test_hash_identity_after_crawl() {
        let mut board = demo_board(scenario_parser());
        board.crawl_root(true).await.unwrap();
        board.update_forum_hash();

        let mut reachable = Vec::new();
        board.root().unwrap().walk(&mut |forum| {
            if !forum.is_root() {
                reachable.push(forum.id.clone());
            }
        });

        for id in reachable {
            let via_hash: *const Forum = board.forum(&id).unwrap();
            let mut via_walk: Option<*const Forum> = None;
            board.root().unwrap().walk(&mut |forum| {
                if forum.id == id && via_walk.is_none() {
                    via_walk = Some(std::ptr::from_ref(forum));
                }
            });
            assert_eq!(
                via_hash,
                via_walk.unwrap(),
                "hash entry for '{id}' is not the tree node"
            );
        }
    }

    #[tokio::test]
    async fn test_crawl_strict_aborts_and_resets_root() {
        let parser = scenario_parser();
        parser.set_failing(true);

        let mut board = demo_board(parser);
        assert!(board.crawl_root(true).await.is_err());
        assert!(board.root().is_none());
        assert!(board.forum_hash().is_empty());
    }

    #[tokio::test]
    async fn test_crawl_lenient_skips_failing_branch() {
        let parser = scenario_parser();
        parser.add_forum("-1", Forum::with_type("2", "Archive", ForumType::Category));
        parser.add_forum("2", Forum::new("30", "Old Stuff"));
        parser.fail_forum_list("2");

        let mut board = demo_board(parser);
        let dup_list = board.crawl_root(false).await.unwrap();

        // the healthy branch survives, the broken one stays childless
        let root = board.root().unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].children.len(), 2);
        assert!(root.children[1].children.is_empty());
        assert!(!dup_list.contains(&"30".to_string()));
    }

    #[tokio::test]
    async fn test_crawl_strict_propagates_branch_failure() {
        let parser = scenario_parser();
        parser.fail_forum_list("1");

        let mut board = demo_board(parser);
        assert!(board.crawl_root(true).await.is_err());
        assert!(board.root().is_none());
    }

    #[tokio::test]
    async fn test_crawl_lenient_keeps_nothing_on_total_failure() {
        let parser = scenario_parser();
        parser.set_failing(true);

        let mut board = demo_board(parser);
        let dup_list = board.crawl_root(false).await.unwrap();
        assert!(dup_list.is_empty());
        assert!(board.root().is_none());
    }

    #[tokio::test]
    async fn test_stale_thread_list_is_flagged() {
        let parser = scenario_parser();
        parser.add_thread("10", Thread::new("t-1"));
        parser.add_thread("11", Thread::new("t-2"));

        let mut board = demo_board(parser);
        board.crawl_root(true).await.unwrap();
        let mut rx = board.subscribe();

        let forum_a = board.forum("10").unwrap().clone();
        let forum_b = board.forum("11").unwrap().clone();
        board.request_thread_list(&forum_a, REQUEST_DEFAULT).unwrap();
        board.request_thread_list(&forum_b, REQUEST_DEFAULT).unwrap();
        assert_eq!(board.current_forum(), Some("11"));

        // a late-arriving result for forum A
        let mut late = forum_a.clone();
        late.set_thread_list(vec![Thread::new("t-1")]).unwrap();
        board.on_thread_list(late);

        // the cursor was not overwritten and the event is flagged
        assert_eq!(board.current_forum(), Some("11"));
        match rx.try_recv().unwrap() {
            BoardEvent::ThreadList {
                forum,
                matches_current,
            } => {
                assert_eq!(forum.id, "10");
                assert!(!matches_current);
                assert_eq!(forum.threads[0].board, Some(board.uuid()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parser_swap_drops_inflight_completions() {
        let mut board = demo_board(scenario_parser());
        board.crawl_root(true).await.unwrap();
        let mut rx = board.subscribe();

        let forum = board.forum("10").unwrap().clone();
        board.request_thread_list(&forum, REQUEST_DEFAULT).unwrap();

        // rebind before the completion is dispatched
        board.set_parser(Arc::new(DemoParser::new("https://other.test")));

        while board.process_completion().await {
            if board.pump_completions() == 0 {
                break;
            }
        }
        assert!(rx.try_recv().is_err(), "ghost completion leaked through");
    }

    #[tokio::test]
    async fn test_update_unread_sets_flag_and_emits() {
        let parser = scenario_parser();
        parser.mark_unread("10");

        let mut board = demo_board(parser);
        board.crawl_root(true).await.unwrap();
        let mut rx = board.subscribe();

        board.update_unread().await;

        assert!(board.has_unread());
        match rx.try_recv().unwrap() {
            BoardEvent::UnreadForums { forums } => {
                assert_eq!(forums.len(), 1);
                assert_eq!(forums[0].id, "10");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_unread_swallows_adapter_errors() {
        let parser = scenario_parser();
        let mut board = demo_board(parser.clone());
        board.crawl_root(true).await.unwrap();
        let mut rx = board.subscribe();

        parser.set_failing(true);
        board.update_unread().await;

        assert!(!board.has_unread());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_last_page_marks_thread_read() {
        let mut board = Board::new("https://demo.test");
        let mut rx = board.subscribe();

        let mut thread = Thread::new("t-1");
        thread.has_unread = true;
        thread.page_number = 2;
        thread.page_count = 2;

        // make the thread current without going through an adapter
        board.current_thread = Some("t-1".to_string());
        board.on_post_list(thread);

        match rx.try_recv().unwrap() {
            BoardEvent::PostList {
                thread,
                matches_current,
            } => {
                assert!(matches_current);
                assert!(!thread.has_unread);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mark_read_updates_tree_node() {
        let parser = scenario_parser();
        let mut board = demo_board(parser);
        board.crawl_root(true).await.unwrap();
        board.forum_mut("10").unwrap().has_unread = true;

        let forum = board.forum("10").unwrap().clone();
        board.mark_forum_read(&forum).unwrap();
        board.process_completion().await;

        assert!(!board.forum("10").unwrap().has_unread);
    }

    #[test]
    fn test_service_url_falls_back_to_url() {
        let mut board = Board::new("https://demo.test");
        assert_eq!(board.service_url(), "https://demo.test");

        board.set_service_url("https://demo.test/api");
        assert_eq!(board.service_url(), "https://demo.test/api");
    }
}
