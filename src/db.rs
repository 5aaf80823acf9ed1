//! Database module for `SQLite` storage (boards, board options, forum trees)
//!
//! The driver forbids sharing a connection across threads, so every calling
//! thread gets its own connection, cached in a thread-local keyed by
//! database path. The [`Database`] handle itself is just the path and is
//! freely cloneable and shareable.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use uuid::Uuid;

use crate::auth;
use crate::board::Board;
use crate::models::{Forum, ForumType, ROOT_FORUM_ID};
use crate::paths;

thread_local! {
    static CONNECTIONS: RefCell<HashMap<PathBuf, Rc<Connection>>> =
        RefCell::new(HashMap::new());
}

/// Database handle
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open or create the database at the default location
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        Self::open_path(&path)
    }

    /// Open or create the database at a specific path
    pub fn open_path(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }

        let db = Self { path: path.clone() };
        db.with_conn(|conn| Self::init(conn))?;

        Ok(db)
    }

    /// Get the default database path
    pub fn default_path() -> Result<PathBuf> {
        paths::database_path()
    }

    /// This thread's connection, opened on first use
    fn connection(&self) -> Result<Rc<Connection>> {
        CONNECTIONS.with(|cell| {
            if let Some(conn) = cell.borrow().get(&self.path) {
                return Ok(Rc::clone(conn));
            }

            tracing::trace!(
                "opening database connection for thread {:?}",
                std::thread::current().id()
            );

            let conn = Rc::new(
                Connection::open(&self.path).with_context(|| {
                    format!("Failed to open database at {}", self.path.display())
                })?,
            );
            cell.borrow_mut()
                .insert(self.path.clone(), Rc::clone(&conn));
            Ok(conn)
        })
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.connection()?;
        f(&conn)
    }

    /// Initialize the database schema
    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r"
            -- Boards table
            CREATE TABLE IF NOT EXISTS boards (
                boardid INTEGER PRIMARY KEY AUTOINCREMENT,
                enabled INTEGER NOT NULL DEFAULT 1,
                autologin INTEGER NOT NULL DEFAULT 0,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                parser TEXT NOT NULL,
                serviceUrl TEXT,
                username TEXT,
                password TEXT,
                icon TEXT,
                lastupdate TEXT,
                uuid TEXT NOT NULL
            );

            -- Per-board options
            CREATE TABLE IF NOT EXISTS boardvars (
                boardvarid INTEGER PRIMARY KEY AUTOINCREMENT,
                boardid INTEGER NOT NULL,
                name TEXT NOT NULL,
                value TEXT
            );

            -- Cached forum trees
            CREATE TABLE IF NOT EXISTS forums (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                boardId INTEGER NOT NULL,
                forumId TEXT NOT NULL,
                parentId TEXT,
                forumName TEXT,
                forumType TEXT NOT NULL,
                forumOrder INTEGER NOT NULL DEFAULT 0
            );

            -- Per-forum metadata
            CREATE TABLE IF NOT EXISTS forumvars (
                forumvarid INTEGER PRIMARY KEY AUTOINCREMENT,
                forumsid INTEGER NOT NULL,
                name TEXT NOT NULL,
                value TEXT
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_boardvars_boardid ON boardvars(boardid);
            CREATE INDEX IF NOT EXISTS idx_forums_board_parent ON forums(boardId, parentId);
            CREATE INDEX IF NOT EXISTS idx_forumvars_forumsid ON forumvars(forumsid);
            ",
        )?;

        Ok(())
    }

    // ==================== Boards ====================

    /// The password value as written to the store, honoring the board's
    /// encryption option
    fn stored_password(board: &Board) -> Result<String> {
        if board.options().get_bool(Board::OPT_USE_ENCRYPTION) {
            auth::encrypt_secret(&board.password)
        } else {
            Ok(board.password.clone())
        }
    }

    /// Insert a new board row, assigning its database id
    pub fn insert_board(&self, board: &mut Board) -> Result<()> {
        let password = Self::stored_password(board)?;

        self.with_conn(|conn| {
            conn.execute(
                r"INSERT INTO boards (enabled, autologin, name, url, parser, serviceUrl, username, password, icon, lastupdate, uuid)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    i32::from(board.enabled),
                    i32::from(board.auto_login),
                    board.name,
                    board.url,
                    board.protocol,
                    board.service_url(),
                    board.username,
                    password,
                    board.icon,
                    board.last_update().to_rfc3339(),
                    board.uuid().to_string(),
                ],
            )?;

            board.set_db_id(conn.last_insert_rowid());
            Ok(())
        })
    }

    /// Get all board rows (options and forum trees not yet attached)
    pub fn select_boards(&self) -> Result<Vec<Board>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT boardid, enabled, autologin, name, url, parser, serviceUrl, username, password, icon, lastupdate, uuid
                 FROM boards ORDER BY boardid",
            )?;

            let boards = stmt.query_map([], Self::row_to_board)?;
            boards.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
    }

    /// Get a single board row by database id
    pub fn select_board(&self, db_id: i64) -> Result<Option<Board>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT boardid, enabled, autologin, name, url, parser, serviceUrl, username, password, icon, lastupdate, uuid
                 FROM boards WHERE boardid = ?1",
            )?;

            match stmt.query_row(params![db_id], Self::row_to_board) {
                Ok(board) => Ok(Some(board)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Helper to convert a row to `Board`
    fn row_to_board(row: &rusqlite::Row<'_>) -> rusqlite::Result<Board> {
        let url: String = row.get(4)?;
        let mut board = Board::new(&url);

        board.set_db_id(row.get(0)?);
        board.enabled = row.get::<_, i32>(1)? != 0;
        board.auto_login = row.get::<_, i32>(2)? != 0;
        board.name = row.get(3)?;
        board.protocol = row.get(5)?;
        board.set_service_url(&row.get::<_, Option<String>>(6)?.unwrap_or_default());
        board.username = row.get::<_, Option<String>>(7)?.unwrap_or_default();
        board.password = row.get::<_, Option<String>>(8)?.unwrap_or_default();
        board.icon = row.get(9)?;

        let update_str: String = row.get::<_, Option<String>>(10)?.unwrap_or_default();
        match DateTime::parse_from_rfc3339(&update_str) {
            Ok(dt) => board.set_last_update(dt.with_timezone(&Utc)),
            Err(_) => {
                tracing::warn!(
                    "could not parse last update '{update_str}' for board {}",
                    board.db_id()
                );
                board.set_last_update(DateTime::<Utc>::UNIX_EPOCH);
            }
        }

        board.set_uuid(Uuid::parse_str(&row.get::<_, String>(11)?).unwrap_or_else(|_| {
            tracing::warn!("invalid uuid stored for board {}", board.db_id());
            Uuid::new_v4()
        }));

        Ok(board)
    }

    /// Update a board row. Fails loudly; the caller decides what to do.
    pub fn update_board(&self, board: &Board) -> Result<()> {
        let password = Self::stored_password(board)?;

        self.with_conn(|conn| {
            let count = conn
                .execute(
                    r"UPDATE boards SET enabled = ?2, autologin = ?3, name = ?4, url = ?5, serviceUrl = ?6,
                       username = ?7, password = ?8, icon = ?9, lastupdate = ?10
                       WHERE boardid = ?1",
                    params![
                        board.db_id(),
                        i32::from(board.enabled),
                        i32::from(board.auto_login),
                        board.name,
                        board.url,
                        board.service_url(),
                        board.username,
                        password,
                        board.icon,
                        board.last_update().to_rfc3339(),
                    ],
                )
                .map_err(|e| {
                    tracing::error!("update of board {} failed: {e}", board.db_id());
                    e
                })?;

            if count == 0 {
                anyhow::bail!("no board row with id {}", board.db_id());
            }
            Ok(())
        })
    }

    // ==================== Board options ====================

    /// Load a board's option rows into its bag
    pub fn load_board_vars(&self, board: &mut Board) -> Result<()> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, value FROM boardvars WHERE boardid = ?1")?;

            let rows = stmt.query_map(params![board.db_id()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                ))
            })?;

            for row in rows {
                let (name, value) = row?;
                board.options_mut().set(&name, value);
            }
            Ok(())
        })
    }

    /// Insert a board's option rows. Individual failures are logged and
    /// skipped; the board row is already durable at this point.
    pub fn insert_board_vars(&self, board: &Board) {
        let result = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("INSERT INTO boardvars (boardid, name, value) VALUES (?1, ?2, ?3)")?;

            for (name, value) in board.options().iter() {
                if let Err(e) = stmt.execute(params![board.db_id(), name, value]) {
                    tracing::error!("could not insert option '{name}': {e}");
                }
            }
            Ok(())
        });

        if let Err(e) = result {
            tracing::error!("could not persist options for board {}: {e}", board.db_id());
        }
    }

    /// Write a board's current options back, inserting rows that do not
    /// exist yet. Per-row failures are logged and skipped.
    pub fn update_board_vars(&self, board: &Board) {
        let result = self.with_conn(|conn| {
            let mut update = conn.prepare(
                "UPDATE boardvars SET value = ?3 WHERE boardid = ?1 AND name = ?2",
            )?;
            let mut insert = conn
                .prepare("INSERT INTO boardvars (boardid, name, value) VALUES (?1, ?2, ?3)")?;

            for (name, value) in board.options().iter() {
                match update.execute(params![board.db_id(), name, value]) {
                    Ok(0) => {
                        if let Err(e) = insert.execute(params![board.db_id(), name, value]) {
                            tracing::error!("could not insert option '{name}': {e}");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("could not update option '{name}': {e}"),
                }
            }
            Ok(())
        });

        if let Err(e) = result {
            tracing::error!("could not update options for board {}: {e}", board.db_id());
        }
    }

    // ==================== Forums ====================

    /// Persist a forum subtree depth-first. Row failures are logged and
    /// skipped; children are still attempted.
    pub fn insert_forum_tree(&self, board_db_id: i64, forum: &mut Forum) {
        let inserted = self.with_conn(|conn| {
            conn.execute(
                r"INSERT INTO forums (boardId, forumId, parentId, forumName, forumType, forumOrder)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    board_db_id,
                    forum.id,
                    forum
                        .parent_id
                        .clone()
                        .unwrap_or_else(|| ROOT_FORUM_ID.to_string()),
                    forum.name,
                    forum.forum_type.as_str(),
                    forum.display_order,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        });

        match inserted {
            Ok(row_id) => {
                forum.db_id = row_id;
                self.insert_forum_vars(forum);
            }
            Err(e) => {
                tracing::error!("could not insert forum '{}': {e}", forum.id);
            }
        }

        for child in &mut forum.children {
            self.insert_forum_tree(board_db_id, child);
        }
    }

    /// Insert a forum's metadata rows, best-effort
    fn insert_forum_vars(&self, forum: &Forum) {
        let result = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("INSERT INTO forumvars (forumsid, name, value) VALUES (?1, ?2, ?3)")?;

            for (name, value) in forum.vars.iter() {
                if let Err(e) = stmt.execute(params![forum.db_id, name, value]) {
                    tracing::error!("could not insert forum var '{name}': {e}");
                }
            }
            Ok(())
        });

        if let Err(e) = result {
            tracing::error!("could not persist vars for forum '{}': {e}", forum.id);
        }
    }

    /// Load a board's full forum tree from the store
    pub fn load_forum_tree(&self, board_db_id: i64, root_id: &str) -> Result<Forum> {
        let mut root = Forum::root(root_id);
        self.load_forum_children(board_db_id, &mut root)?;
        Ok(root)
    }

    fn load_forum_children(&self, board_db_id: i64, parent: &mut Forum) -> Result<()> {
        let children = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, forumId, forumName, forumType, forumOrder
                 FROM forums WHERE boardId = ?1 AND parentId = ?2
                 ORDER BY forumOrder, id",
            )?;

            let rows = stmt.query_map(params![board_db_id, parent.id], |row| {
                let forum_id: String = row.get(1)?;
                let name: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
                let type_str: String = row.get(3)?;

                let mut forum = Forum::with_type(
                    &forum_id,
                    &name,
                    ForumType::from_str(&type_str).unwrap_or(ForumType::Link),
                );
                forum.db_id = row.get(0)?;
                forum.display_order = row.get(4)?;
                Ok(forum)
            })?;

            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })?;

        for mut forum in children {
            self.load_forum_vars(&mut forum)?;

            let child = parent
                .add_child(forum)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            self.load_forum_children(board_db_id, child)?;
        }

        Ok(())
    }

    fn load_forum_vars(&self, forum: &mut Forum) -> Result<()> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, value FROM forumvars WHERE forumsid = ?1")?;

            let rows = stmt.query_map(params![forum.db_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                ))
            })?;

            for row in rows {
                let (name, value) = row?;
                forum.vars.set(&name, value);
            }
            Ok(())
        })
    }

    // ==================== Deletion ====================

    /// Delete a board with all of its option and forum rows, and renumber
    /// the remaining boards' display orders, in one transaction.
    pub fn delete_board(&self, db_id: i64, reorder: &[(i64, u32)]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "DELETE FROM forumvars WHERE forumsid IN (SELECT id FROM forums WHERE boardId = ?1)",
                params![db_id],
            )?;
            tx.execute("DELETE FROM forums WHERE boardId = ?1", params![db_id])?;
            tx.execute("DELETE FROM boardvars WHERE boardid = ?1", params![db_id])?;
            tx.execute("DELETE FROM boards WHERE boardid = ?1", params![db_id])?;

            for (other_id, order) in reorder {
                tx.execute(
                    "UPDATE boardvars SET value = ?3 WHERE boardid = ?1 AND name = ?2",
                    params![other_id, Board::OPT_DISPLAY_ORDER, order.to_string()],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }
}
