//! In-memory protocol adapter
//!
//! Serves a configurable forum graph without touching the network. Backs
//! the `demo` CLI flow and the core's tests; the graph can be reshaped
//! after binding, which is how structure drift is simulated.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::models::{Forum, ForumType, Post, Thread, Vars};

use super::{LoginInfo, Parser, ParserError, ParserResult, PostListOption, RequestOptions};

/// Protocol name this adapter registers under
pub const PROTOCOL_NAME: &str = "demo";

#[derive(Default)]
struct DemoState {
    /// parent forum id -> ordered child prototypes
    forums: HashMap<String, Vec<Forum>>,
    /// forum id -> threads
    threads: HashMap<String, Vec<Thread>>,
    /// thread id -> posts
    posts: HashMap<String, Vec<Post>>,
    /// forum ids with unread content
    unread: HashSet<String>,
    /// parent ids whose child listing fails
    fail_listings: HashSet<String>,
}

/// An adapter serving canned data from memory
#[derive(Clone)]
pub struct DemoParser {
    service_url: String,
    credentials: Option<(String, String)>,
    state: Arc<Mutex<DemoState>>,
    failing: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
}

impl DemoParser {
    /// An adapter with an empty graph
    pub fn new(service_url: &str) -> Self {
        Self {
            service_url: service_url.to_string(),
            credentials: None,
            state: Arc::new(Mutex::new(DemoState::default())),
            failing: Arc::new(AtomicBool::new(false)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// An adapter pre-populated with a small board
    pub fn sample(service_url: &str) -> Self {
        let parser = Self::new(service_url);

        let general = Forum::with_type("1", "General", ForumType::Category);
        let mut wiki = Forum::with_type("20", "Community Wiki", ForumType::Link);
        wiki.vars.set("url", "https://wiki.example.test");

        parser.add_forum(&parser.root_forum_id(), general);
        parser.add_forum(&parser.root_forum_id(), wiki);
        parser.add_forum("1", Forum::new("10", "Announcements"));
        parser.add_forum("1", Forum::new("11", "Off-Topic"));

        let mut welcome = Thread::new("t-100");
        welcome.title = "Welcome to the board".to_string();
        welcome.author = "admin".to_string();
        welcome.preview_text = "Introduce yourself here.".to_string();
        welcome.sticky = true;
        parser.add_thread("10", welcome);

        let mut rules = Thread::new("t-101");
        rules.title = "Forum rules".to_string();
        rules.author = "admin".to_string();
        parser.add_thread("10", rules);

        let mut first = Post::new("p-1000");
        first.author = "admin".to_string();
        first.text = "<p>Welcome! Say hello below.</p>".to_string();
        first.index = 1;
        parser.add_post("t-100", first);

        let mut reply = Post::new("p-1001");
        reply.author = "newuser".to_string();
        reply.text = "Hello everyone".to_string();
        reply.index = 2;
        parser.add_post("t-100", reply);

        parser.mark_unread("10");
        parser
    }

    /// Only accept this username/password pair at login. Without this, any
    /// non-empty username logs in.
    pub fn require_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Append a child forum under `parent_id`
    pub fn add_forum(&self, parent_id: &str, forum: Forum) {
        let mut state = self.state.lock().expect("demo state");
        state
            .forums
            .entry(parent_id.to_string())
            .or_default()
            .push(forum);
    }

    /// Remove every child of `parent_id`
    pub fn clear_forum(&self, parent_id: &str) {
        let mut state = self.state.lock().expect("demo state");
        state.forums.remove(parent_id);
    }

    /// Append a thread to a forum
    pub fn add_thread(&self, forum_id: &str, thread: Thread) {
        let mut state = self.state.lock().expect("demo state");
        state
            .threads
            .entry(forum_id.to_string())
            .or_default()
            .push(thread);
    }

    /// Append a post to a thread
    pub fn add_post(&self, thread_id: &str, post: Post) {
        let mut state = self.state.lock().expect("demo state");
        state
            .posts
            .entry(thread_id.to_string())
            .or_default()
            .push(post);
    }

    /// Flag a forum as holding unread content
    pub fn mark_unread(&self, forum_id: &str) {
        let mut state = self.state.lock().expect("demo state");
        state.unread.insert(forum_id.to_string());
    }

    /// When set, every operation fails with a simulated network error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make child listings of one forum fail while everything else works
    pub fn fail_forum_list(&self, parent_id: &str) {
        let mut state = self.state.lock().expect("demo state");
        state.fail_listings.insert(parent_id.to_string());
    }

    fn check_reachable(&self) -> ParserResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ParserError::new(format!(
                "could not reach '{}'",
                self.service_url
            ))
            .with_details("simulated network failure"));
        }
        Ok(())
    }

    fn find_forum(state: &DemoState, forum_id: &str) -> Option<Forum> {
        state
            .forums
            .values()
            .flatten()
            .find(|f| f.id == forum_id)
            .cloned()
    }

    fn assign_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Parser for DemoParser {
    fn name(&self) -> &str {
        PROTOCOL_NAME
    }

    async fn login(&self, info: &LoginInfo) -> ParserResult<Vars> {
        self.check_reachable()?;

        let accepted = match &self.credentials {
            Some((username, password)) => {
                info.username == *username && info.password == *password
            }
            None => !info.username.is_empty(),
        };

        let mut params = Vars::new();
        params.set("success", accepted);
        if accepted {
            params.set("username", &info.username);
        } else {
            params.set("error", "invalid username or password");
        }

        Ok(params)
    }

    async fn forum_list(&self, parent_id: &str) -> ParserResult<Vec<Forum>> {
        self.check_reachable()?;

        let state = self.state.lock().expect("demo state");
        if state.fail_listings.contains(parent_id) {
            return Err(ParserError::new(format!(
                "could not list children of forum '{parent_id}'"
            )));
        }

        Ok(state.forums.get(parent_id).cloned().unwrap_or_default())
    }

    async fn thread_list(&self, mut forum: Forum, _options: RequestOptions) -> ParserResult<Forum> {
        self.check_reachable()?;

        let all = {
            let state = self.state.lock().expect("demo state");
            state.threads.get(&forum.id).cloned().unwrap_or_default()
        };

        let per_page = forum.per_page.max(1) as usize;
        forum.page_count = (all.len().max(1)).div_ceil(per_page) as u32;
        forum.page_number = forum.page_number.clamp(1, forum.page_count);

        let start = (forum.page_number as usize - 1) * per_page;
        let page: Vec<Thread> = all.into_iter().skip(start).take(per_page).collect();
        forum
            .set_thread_list(page)
            .map_err(|e| ParserError::new(e.to_string()))?;

        Ok(forum)
    }

    async fn post_list(
        &self,
        mut thread: Thread,
        view: PostListOption,
        _options: RequestOptions,
    ) -> ParserResult<Thread> {
        self.check_reachable()?;

        let all = {
            let state = self.state.lock().expect("demo state");
            state.posts.get(&thread.id).cloned().unwrap_or_default()
        };

        let per_page = thread.per_page.max(1) as usize;
        thread.page_count = (all.len().max(1)).div_ceil(per_page) as u32;
        thread.page_number = match view {
            PostListOption::FirstPost => 1,
            PostListOption::FirstUnread | PostListOption::LastPost => thread.page_count,
        };

        let start = (thread.page_number as usize - 1) * per_page;
        thread.posts = all.into_iter().skip(start).take(per_page).collect();
        for post in &mut thread.posts {
            post.thread_id = Some(thread.id.clone());
        }

        Ok(thread)
    }

    async fn submit_thread(&self, mut thread: Thread) -> ParserResult<Thread> {
        self.check_reachable()?;

        if thread.id.is_empty() {
            thread.id = self.assign_id("t");
        }

        let mut state = self.state.lock().expect("demo state");
        if let Some(forum_id) = thread.forum_id.clone() {
            state
                .threads
                .entry(forum_id)
                .or_default()
                .push(thread.clone());
        }

        Ok(thread)
    }

    async fn submit_post(&self, mut post: Post) -> ParserResult<Post> {
        self.check_reachable()?;

        if post.id.is_empty() {
            post.id = self.assign_id("p");
        }

        let mut state = self.state.lock().expect("demo state");
        if let Some(thread_id) = post.thread_id.clone() {
            state.posts.entry(thread_id).or_default().push(post.clone());
        }

        Ok(post)
    }

    async fn mark_forum_read(&self, forum: &Forum) -> ParserResult<Forum> {
        self.check_reachable()?;

        let mut state = self.state.lock().expect("demo state");
        state.unread.remove(&forum.id);

        let mut marked = forum.clone();
        marked.has_unread = false;
        Ok(marked)
    }

    async fn unread_forums(&self) -> ParserResult<Vec<Forum>> {
        self.check_reachable()?;

        let state = self.state.lock().expect("demo state");
        let mut list: Vec<Forum> = state
            .unread
            .iter()
            .filter_map(|id| Self::find_forum(&state, id))
            .map(|mut f| {
                f.has_unread = true;
                f.children.clear();
                f
            })
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(list)
    }

    fn clone_parser(&self) -> Box<dyn Parser> {
        // a second handle onto the same remote board
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_accepts_any_user_by_default() {
        let parser = DemoParser::new("https://demo.test");
        let info = LoginInfo {
            username: "someone".to_string(),
            password: String::new(),
        };
        let params = parser.login(&info).await.unwrap();
        assert!(params.get_bool("success"));
    }

    #[tokio::test]
    async fn test_login_checks_required_credentials() {
        let parser = DemoParser::new("https://demo.test").require_credentials("wren", "seeds");

        let bad = LoginInfo {
            username: "wren".to_string(),
            password: "wrong".to_string(),
        };
        let params = parser.login(&bad).await.unwrap();
        assert!(!params.get_bool("success"));
        assert!(params.get("error").is_some());

        let good = LoginInfo {
            username: "wren".to_string(),
            password: "seeds".to_string(),
        };
        assert!(parser.login(&good).await.unwrap().get_bool("success"));
    }

    #[tokio::test]
    async fn test_sample_graph_shape() {
        let parser = DemoParser::sample("https://demo.test");

        let top = parser.forum_list(&parser.root_forum_id()).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].forum_type, ForumType::Category);
        assert_eq!(top[1].forum_type, ForumType::Link);

        let general = parser.forum_list("1").await.unwrap();
        assert_eq!(general.len(), 2);
        assert_eq!(general[0].name, "Announcements");
    }

    #[tokio::test]
    async fn test_thread_list_pages() {
        let parser = DemoParser::new("https://demo.test");
        parser.add_forum("-1", Forum::new("10", "Announcements"));
        for i in 0..25 {
            parser.add_thread("10", Thread::new(&format!("t-{i}")));
        }

        let mut forum = Forum::new("10", "Announcements");
        forum.per_page = 10;
        let forum = parser.thread_list(forum, super::super::REQUEST_DEFAULT).await.unwrap();

        assert_eq!(forum.page_count, 3);
        assert_eq!(forum.threads.len(), 10);
        assert_eq!(forum.threads[0].forum_id.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_failing_switch() {
        let parser = DemoParser::sample("https://demo.test");
        parser.set_failing(true);

        let err = parser.forum_list("-1").await.unwrap_err();
        assert!(err.message.contains("demo.test"));
        assert!(err.details.is_some());
    }

    #[tokio::test]
    async fn test_unread_forums_and_mark_read() {
        let parser = DemoParser::sample("https://demo.test");

        let unread = parser.unread_forums().await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "10");
        assert!(unread[0].has_unread);

        parser.mark_forum_read(&unread[0]).await.unwrap();
        assert!(parser.unread_forums().await.unwrap().is_empty());
    }
}
