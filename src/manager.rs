//! Board registry and persistence orchestration
//!
//! The manager owns the canonical collection of boards for the process,
//! loads them from the store at startup, and keeps the store in sync
//! through CRUD operations. Collection changes are announced to observers
//! as begin/end event pairs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::auth;
use crate::board::Board;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::events::{ManagerEvent, Subscribers};
use crate::models::ROOT_FORUM_ID;

/// A shared, lockable board. The background worker and the orchestration
/// side both hold one of these.
pub type BoardHandle = Arc<tokio::sync::Mutex<Board>>;

/// Wrap a board into a shareable handle
pub fn board_handle(board: Board) -> BoardHandle {
    Arc::new(tokio::sync::Mutex::new(board))
}

/// Registry of configured boards backed by the SQLite store.
///
/// Explicitly constructed and passed by reference to whatever needs it;
/// there is no process-global instance.
pub struct BoardManager {
    db: Database,
    boards: Mutex<Vec<BoardHandle>>,
    subscribers: Mutex<Subscribers<ManagerEvent>>,
}

impl BoardManager {
    /// Create a manager over an open database
    pub fn new(db: Database) -> Self {
        Self {
            db,
            boards: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Subscribers::new()),
        }
    }

    /// The underlying database handle
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Register an observer of collection changes
    pub fn subscribe(&self) -> UnboundedReceiver<ManagerEvent> {
        self.subscribers.lock().expect("subscriber lock").subscribe()
    }

    fn emit(&self, event: ManagerEvent) {
        self.subscribers.lock().expect("subscriber lock").emit(&event);
    }

    /// Number of boards in the collection
    pub fn board_count(&self) -> usize {
        self.boards.lock().expect("board list lock").len()
    }

    /// Snapshot of the ordered collection
    pub fn boards(&self) -> Vec<BoardHandle> {
        self.boards.lock().expect("board list lock").clone()
    }

    /// The board at `index` in display order
    pub fn board_by_index(&self, index: usize) -> Option<BoardHandle> {
        self.boards
            .lock()
            .expect("board list lock")
            .get(index)
            .cloned()
    }

    /// Find a board by its stable identity
    pub async fn board_by_uuid(&self, uuid: Uuid) -> Option<BoardHandle> {
        for handle in self.boards() {
            if handle.lock().await.uuid() == uuid {
                return Some(handle);
            }
        }
        None
    }

    fn db_err(e: anyhow::Error) -> Error {
        Error::database(e.to_string())
    }

    fn decrypt_password(board: &mut Board) {
        if board.options().get_bool(Board::OPT_USE_ENCRYPTION) {
            match auth::decrypt_secret(&board.password) {
                Ok(plain) => board.password = plain,
                Err(e) => {
                    tracing::warn!("could not decrypt password for '{}': {e}", board.name);
                }
            }
        }
    }

    /// Attach options and the persisted forum tree to a bare board row
    fn hydrate(&self, board: &mut Board) -> Result<()> {
        self.db.load_board_vars(board).map_err(Self::db_err)?;
        Self::decrypt_password(board);

        let root_id = board
            .options()
            .get(Board::OPT_ROOT_ID)
            .unwrap_or(ROOT_FORUM_ID)
            .to_string();
        let root = self
            .db
            .load_forum_tree(board.db_id(), &root_id)
            .map_err(Self::db_err)?;
        board.set_root(root);

        Ok(())
    }

    /// Load every persisted board, replacing the in-memory collection.
    ///
    /// Rows are deduplicated by primary key defensively, and the resulting
    /// collection is sorted by the `displayOrder` option.
    pub fn load_boards(&self) -> Result<usize> {
        let rows = self.db.select_boards().map_err(Self::db_err)?;

        let mut seen: HashSet<i64> = HashSet::new();
        let mut loaded: Vec<Board> = Vec::new();

        for mut board in rows {
            if !seen.insert(board.db_id()) {
                tracing::warn!("duplicate board row {} in store, skipping", board.db_id());
                continue;
            }

            self.hydrate(&mut board)?;

            tracing::trace!(
                "loaded '{}', last updated {}",
                board.name,
                board.last_update()
            );
            loaded.push(board);
        }

        loaded.sort_by_key(Board::display_order);

        let count = loaded.len();
        *self.boards.lock().expect("board list lock") =
            loaded.into_iter().map(board_handle).collect();

        tracing::info!("{count} board(s) loaded");
        Ok(count)
    }

    /// Persist a new board and insert it into the collection.
    ///
    /// A fresh uuid is assigned; the board row insert is all-or-nothing,
    /// while the option and forum cascades are best-effort once the row
    /// itself is durable.
    pub async fn create_board(&self, handle: &BoardHandle) -> Result<()> {
        {
            let mut board = handle.lock().await;
            board.set_uuid(Uuid::new_v4());

            self.db.insert_board(&mut board).map_err(|e| {
                tracing::error!("could not create board '{}': {e}", board.name);
                Self::db_err(e)
            })?;

            self.db.insert_board_vars(&board);

            let db_id = board.db_id();
            if let Some(root) = board.root_mut() {
                for child in &mut root.children {
                    self.db.insert_forum_tree(db_id, child);
                }
            }
        }

        {
            let mut list = self.boards.lock().expect("board list lock");
            self.emit(ManagerEvent::BeginAddBoard { index: list.len() });
            list.push(handle.clone());
        }
        self.emit(ManagerEvent::EndAddBoard);

        self.sort().await;
        Ok(())
    }

    /// Re-sort the collection by display order
    pub async fn sort(&self) {
        let handles = self.boards();

        let mut keyed = Vec::with_capacity(handles.len());
        for handle in handles {
            let order = handle.lock().await.display_order();
            keyed.push((order, handle));
        }
        keyed.sort_by_key(|(order, _)| *order);

        *self.boards.lock().expect("board list lock") =
            keyed.into_iter().map(|(_, handle)| handle).collect();
    }

    /// Persist a board's row and options
    pub fn update_board(&self, board: &Board) -> Result<()> {
        self.db.update_board(board).map_err(|e| {
            tracing::error!("could not update board '{}': {e}", board.name);
            Self::db_err(e)
        })?;

        self.db.update_board_vars(board);
        Ok(())
    }

    /// Delete a board from the store and the collection.
    ///
    /// The remaining boards' display orders are compacted dense in the
    /// same transaction as the delete, then mirrored in memory.
    pub async fn delete_board(&self, handle: &BoardHandle) -> Result<()> {
        let (db_id, uuid, deleted_order) = {
            let board = handle.lock().await;
            (board.db_id(), board.uuid(), board.display_order())
        };

        // figure out which boards shift down before touching anything
        let mut shifted: Vec<(BoardHandle, u32)> = Vec::new();
        let mut reorder: Vec<(i64, u32)> = Vec::new();
        for other in self.boards() {
            let board = other.lock().await;
            if board.uuid() == uuid {
                continue;
            }

            let order = board.display_order();
            if order > deleted_order {
                reorder.push((board.db_id(), order - 1));
                drop(board);
                shifted.push((other.clone(), order - 1));
            }
        }

        self.db
            .delete_board(db_id, &reorder)
            .map_err(Self::db_err)?;

        for (other, new_order) in shifted {
            other.lock().await.set_display_order(new_order);
        }

        let removed = {
            let mut list = self.boards.lock().expect("board list lock");
            match list.iter().position(|h| Arc::ptr_eq(h, handle)) {
                Some(index) => {
                    self.emit(ManagerEvent::BeginRemoveBoard { index });
                    list.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.emit(ManagerEvent::EndRemoveBoard);
        }

        Ok(())
    }

    /// Reload a single persisted board as a fresh aggregate, outside the
    /// collection. Used by the structure checker to compare against what
    /// the store believes.
    pub fn board_info(&self, db_id: i64) -> Result<Option<Board>> {
        let Some(mut board) = self.db.select_board(db_id).map_err(Self::db_err)? else {
            return Ok(None);
        };

        self.hydrate(&mut board)?;
        Ok(Some(board))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Forum, ForumType};
    use tempfile::tempdir;

    fn test_manager() -> (tempfile::TempDir, BoardManager) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        let db = Database::open_path(&path).unwrap();
        (dir, BoardManager::new(db))
    }

    fn board_named(name: &str, order: u32) -> Board {
        let mut board = Board::new(&format!("https://{name}.example.test"));
        board.name = name.to_string();
        board.protocol = "demo".to_string();
        board.username = "wren".to_string();
        board.set_display_order(order);
        board
    }

    fn sample_root() -> Forum {
        let mut root = Forum::root(ROOT_FORUM_ID);
        let mut general = Forum::with_type("1", "General", ForumType::Category);
        general.add_child(Forum::new("10", "Announcements")).unwrap();
        general.add_child(Forum::new("11", "Off-Topic")).unwrap();
        root.add_child(general).unwrap();
        root
    }

    #[tokio::test]
    async fn test_create_and_load_round_trip() {
        let (_dir, manager) = test_manager();

        let mut board = board_named("alpha", 0);
        board.options_mut().set(Board::OPT_REFRESH_RATE, 300);
        board.set_root(sample_root());
        let handle = board_handle(board);
        manager.create_board(&handle).await.unwrap();

        let mut second = board_named("beta", 1);
        second.set_root(Forum::root(ROOT_FORUM_ID));
        manager.create_board(&board_handle(second)).await.unwrap();

        // a fresh manager over the same store sees the same data
        let reloaded = BoardManager::new(manager.database().clone());
        assert_eq!(reloaded.load_boards().unwrap(), 2);

        let first = reloaded.board_by_index(0).unwrap();
        let first = first.lock().await;
        assert_eq!(first.name, "alpha");
        assert_eq!(first.url, "https://alpha.example.test");
        assert_eq!(
            first.options().get_parsed::<u64>(Board::OPT_REFRESH_RATE),
            Some(300)
        );
        assert!(first.root().unwrap().is_structure_equal(&sample_root()));
        // the tree is re-indexed on load
        assert_eq!(first.forum("10").unwrap().name, "Announcements");
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_uuid_and_db_id() {
        let (_dir, manager) = test_manager();

        let handle = board_handle(board_named("gamma", 0));
        let before = handle.lock().await.uuid();
        manager.create_board(&handle).await.unwrap();

        let board = handle.lock().await;
        assert_ne!(board.uuid(), before);
        assert!(board.db_id() > 0);
    }

    #[tokio::test]
    async fn test_collection_sorted_by_display_order() {
        let (_dir, manager) = test_manager();

        manager
            .create_board(&board_handle(board_named("second", 1)))
            .await
            .unwrap();
        manager
            .create_board(&board_handle(board_named("first", 0)))
            .await
            .unwrap();

        let first = manager.board_by_index(0).unwrap();
        assert_eq!(first.lock().await.name, "first");
    }

    #[tokio::test]
    async fn test_delete_compacts_display_orders() {
        let (_dir, manager) = test_manager();

        for (name, order) in [("a", 0), ("b", 1), ("c", 2), ("d", 3)] {
            manager
                .create_board(&board_handle(board_named(name, order)))
                .await
                .unwrap();
        }

        let victim = manager.board_by_index(2).unwrap();
        assert_eq!(victim.lock().await.name, "c");
        manager.delete_board(&victim).await.unwrap();

        // remaining orders are dense: {0, 1, 2}
        let mut orders = Vec::new();
        for handle in manager.boards() {
            orders.push(handle.lock().await.display_order());
        }
        assert_eq!(orders, vec![0, 1, 2]);

        // and the compaction is persisted
        let reloaded = BoardManager::new(manager.database().clone());
        reloaded.load_boards().unwrap();
        let mut persisted = Vec::new();
        for handle in reloaded.boards() {
            let board = handle.lock().await;
            persisted.push((board.name.clone(), board.display_order()));
        }
        assert_eq!(
            persisted,
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 1),
                ("d".to_string(), 2)
            ]
        );
    }

    #[tokio::test]
    async fn test_collection_events_come_in_pairs() {
        let (_dir, manager) = test_manager();
        let mut rx = manager.subscribe();

        let handle = board_handle(board_named("only", 0));
        manager.create_board(&handle).await.unwrap();
        manager.delete_board(&handle).await.unwrap();

        assert!(matches!(
            rx.try_recv().unwrap(),
            ManagerEvent::BeginAddBoard { index: 0 }
        ));
        assert!(matches!(rx.try_recv().unwrap(), ManagerEvent::EndAddBoard));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ManagerEvent::BeginRemoveBoard { index: 0 }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ManagerEvent::EndRemoveBoard
        ));
    }

    #[tokio::test]
    async fn test_board_by_uuid() {
        let (_dir, manager) = test_manager();

        let handle = board_handle(board_named("findme", 0));
        manager.create_board(&handle).await.unwrap();
        let uuid = handle.lock().await.uuid();

        let found = manager.board_by_uuid(uuid).await.unwrap();
        assert!(Arc::ptr_eq(&found, &handle));
        assert!(manager.board_by_uuid(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_board_info_is_detached() {
        let (_dir, manager) = test_manager();

        let mut board = board_named("delta", 0);
        board.set_root(sample_root());
        let handle = board_handle(board);
        manager.create_board(&handle).await.unwrap();
        let db_id = handle.lock().await.db_id();

        let info = manager.board_info(db_id).unwrap().unwrap();
        assert_eq!(info.name, "delta");
        assert!(info.root().unwrap().is_structure_equal(&sample_root()));

        // mutating the detached copy does not touch the registered board
        assert_eq!(handle.lock().await.name, "delta");
    }
}
