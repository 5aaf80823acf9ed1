//! Forum model: the nodes of a board's tree

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::{Thread, Vars};

/// Sentinel id of the synthetic root node. No protocol id corresponds to it.
pub const ROOT_FORUM_ID: &str = "-1";

/// Default page size before a board's per-page options are applied
pub const PER_PAGE_DEFAULT: u32 = 20;

/// The kind of node a forum is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ForumType {
    /// A postable area holding threads
    #[default]
    Forum,
    /// A container grouping other forums; carries no threads
    Category,
    /// A navigation pass-through pointing at an external URL; never crawled
    Link,
}

impl ForumType {
    /// Stable string form, as stored in the database
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forum => "FORUM",
            Self::Category => "CATEGORY",
            Self::Link => "LINK",
        }
    }

    /// Parse from the stored string form
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "FORUM" => Some(Self::Forum),
            "CATEGORY" => Some(Self::Category),
            "LINK" => Some(Self::Link),
            _ => None,
        }
    }
}

impl std::fmt::Display for ForumType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A node in a board's forum tree.
///
/// Forums own their ordered children and, for Forum-type nodes, a transient
/// collection of threads fetched on demand. The parent link is a non-owning
/// back-reference by id; forum ids are unique within a board's tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forum {
    /// Protocol-assigned id, opaque to the core
    pub id: String,
    /// Local database row id; -1 until persisted
    pub db_id: i64,
    /// Display name
    pub name: String,
    /// Node kind
    pub forum_type: ForumType,
    /// Sort key among siblings
    pub display_order: i32,
    /// Current page of threads (1-based)
    pub page_number: u32,
    /// Total number of thread pages
    pub page_count: u32,
    /// Threads per page
    pub per_page: u32,
    /// Whether the forum contains unread content
    pub has_unread: bool,
    /// Id of the parent node; `None` only on the root
    pub parent_id: Option<String>,
    /// Ordered child forums
    pub children: Vec<Forum>,
    /// Threads for the current page. Transient: fetched on demand, cleared
    /// when the forum loses focus, never persisted.
    #[serde(skip)]
    pub threads: Vec<Thread>,
    /// Owning board, assigned by the board
    pub board: Option<Uuid>,
    /// Protocol-specific metadata (external URL for Link nodes, etc.)
    pub vars: Vars,
    is_root: bool,
}

impl Forum {
    /// Create a forum node with the given id and name
    pub fn new(id: &str, name: &str) -> Self {
        Self::with_type(id, name, ForumType::Forum)
    }

    /// Create a forum node with an explicit type
    pub fn with_type(id: &str, name: &str, forum_type: ForumType) -> Self {
        Self {
            id: id.to_string(),
            db_id: -1,
            name: name.to_string(),
            forum_type,
            display_order: 0,
            page_number: 1,
            page_count: 1,
            per_page: PER_PAGE_DEFAULT,
            has_unread: false,
            parent_id: None,
            children: Vec::new(),
            threads: Vec::new(),
            board: None,
            vars: Vars::new(),
            is_root: false,
        }
    }

    /// Create the synthetic root node for a tree. The root has no parent,
    /// an empty name, and no protocol id of its own.
    pub fn root(root_id: &str) -> Self {
        let mut root = Self::new(root_id, "");
        root.is_root = true;
        root
    }

    /// Whether this node is the synthetic root
    pub fn is_root(&self) -> bool {
        self.is_root && self.parent_id.is_none()
    }

    /// Append `child`, setting its parent back-reference. Fails if the
    /// child already belongs to a different parent.
    pub fn add_child(&mut self, mut child: Forum) -> Result<&mut Forum> {
        if let Some(parent_id) = &child.parent_id {
            if parent_id != &self.id {
                return Err(Error::invalid_state(format!(
                    "forum '{}' already has parent '{}'",
                    child.id, parent_id
                )));
            }
        }

        child.parent_id = Some(self.id.clone());
        self.children.push(child);
        Ok(self.children.last_mut().expect("just pushed"))
    }

    /// Replace the forum's thread list wholesale. Stale thread objects are
    /// dropped, not merged. Category nodes carry no threads.
    pub fn set_thread_list(&mut self, mut threads: Vec<Thread>) -> Result<()> {
        if self.forum_type == ForumType::Category {
            return Err(Error::invalid_state(format!(
                "category '{}' cannot hold threads",
                self.id
            )));
        }

        for thread in &mut threads {
            thread.forum_id = Some(self.id.clone());
        }

        self.threads = threads;
        Ok(())
    }

    /// Discard the current thread list. Called when the forum loses focus;
    /// thread lifetime ends here, not at some later collection point.
    pub fn clear_threads(&mut self) {
        self.threads.clear();
    }

    /// Deep structural comparison.
    ///
    /// Two trees are structurally equal iff every node's id, type, and
    /// in-order child ids match. Unread state, names, paging, and thread
    /// content do not participate, so content churn never reads as layout
    /// drift.
    pub fn is_structure_equal(&self, other: &Forum) -> bool {
        if self.id != other.id || self.forum_type != other.forum_type {
            return false;
        }

        if self.children.len() != other.children.len() {
            return false;
        }

        self.children
            .iter()
            .zip(other.children.iter())
            .all(|(a, b)| a.is_structure_equal(b))
    }

    /// Pre-order walk over this node and every descendant
    pub fn walk(&self, visit: &mut impl FnMut(&Forum)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Number of nodes in the subtree, this node included
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Forum::node_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Forum {
        let mut root = Forum::root(ROOT_FORUM_ID);
        let mut general = Forum::with_type("1", "General", ForumType::Category);
        general.add_child(Forum::new("10", "Announcements")).unwrap();
        general.add_child(Forum::new("11", "Off-Topic")).unwrap();
        root.add_child(general).unwrap();
        root
    }

    #[test]
    fn test_root_is_root() {
        let root = Forum::root(ROOT_FORUM_ID);
        assert!(root.is_root());

        let plain = Forum::new(ROOT_FORUM_ID, "not really");
        assert!(!plain.is_root());
    }

    #[test]
    fn test_add_child_sets_parent() {
        let mut root = Forum::root(ROOT_FORUM_ID);
        let child = root.add_child(Forum::new("5", "News")).unwrap();
        assert_eq!(child.parent_id.as_deref(), Some(ROOT_FORUM_ID));
    }

    #[test]
    fn test_add_child_rejects_reparenting() {
        let mut a = Forum::new("a", "A");
        let mut owned = Forum::new("x", "X");
        owned.parent_id = Some("b".to_string());

        let err = a.add_child(owned).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_category_rejects_threads() {
        let mut category = Forum::with_type("1", "General", ForumType::Category);
        let err = category
            .set_thread_list(vec![Thread::new("t1")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_set_thread_list_replaces_and_backlinks() {
        let mut forum = Forum::new("10", "Announcements");
        forum
            .set_thread_list(vec![Thread::new("t1"), Thread::new("t2")])
            .unwrap();
        assert_eq!(forum.threads.len(), 2);
        assert_eq!(forum.threads[0].forum_id.as_deref(), Some("10"));

        forum.set_thread_list(vec![Thread::new("t3")]).unwrap();
        assert_eq!(forum.threads.len(), 1);
        assert_eq!(forum.threads[0].id, "t3");
    }

    #[test]
    fn test_structure_equal_matches_identical_trees() {
        assert!(sample_tree().is_structure_equal(&sample_tree()));
    }

    #[test]
    fn test_structure_equal_is_type_sensitive() {
        let a = sample_tree();
        let mut b = sample_tree();
        b.children[0].children[1].forum_type = ForumType::Link;
        assert!(!a.is_structure_equal(&b));
    }

    #[test]
    fn test_structure_equal_is_order_sensitive() {
        let a = sample_tree();
        let mut b = sample_tree();
        b.children[0].children.swap(0, 1);
        assert!(!a.is_structure_equal(&b));
    }

    #[test]
    fn test_structure_equal_ignores_unread_and_names() {
        let a = sample_tree();
        let mut b = sample_tree();
        b.children[0].children[0].has_unread = true;
        b.children[0].children[0].name = "Renamed".to_string();
        assert!(a.is_structure_equal(&b));
    }

    #[test]
    fn test_structure_equal_detects_missing_child() {
        let a = sample_tree();
        let mut b = sample_tree();
        b.children[0].children.pop();
        assert!(!a.is_structure_equal(&b));
    }

    #[test]
    fn test_node_count() {
        assert_eq!(sample_tree().node_count(), 4);
    }
}
