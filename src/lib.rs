//! # Roost 🪺
//!
//! A multi-protocol message board client core.
//!
//! ## Overview
//!
//! Roost manages connections to online discussion forums across forum
//! software families through a pluggable protocol adapter. Each configured
//! connection is a [`Board`]: credentials, a bound adapter, and a cached
//! tree of forums that is crawled, indexed, and kept in sync with the
//! server. Boards live in a [`BoardManager`] registry persisted to SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       BoardManager                          │
//! │   Registry + persistence; collection add/remove events      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │      Board      │ │     Parser      │ │  UpdateWorker   │
//! │                 │ │                 │ │                 │
//! │ • Forum tree    │ │ • Capability    │ │ • Unread poll   │
//! │ • Crawl + index │ │   contract      │ │ • Drift check   │
//! │ • Request/event │ │ • Registry      │ │ • Self-pacing   │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//!          │                   │                   │
//!          └───────────────────┴───────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │    Database     │ │      Auth       │ │     Models      │
//! │                 │ │                 │ │                 │
//! │ • boards        │ │ • AES-256-GCM   │ │ • Forum         │
//! │ • boardvars     │ │ • Machine key   │ │ • Thread        │
//! │ • forums/vars   │ │                 │ │ • Post, Vars    │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`board`] — the [`Board`] aggregate: crawl, forum index, requests
//! - [`manager`] — board registry and persistence orchestration
//! - [`parser`] — protocol adapter contract and registry
//! - [`db`] — `SQLite` storage for boards, options, forum trees
//! - [`worker`] — per-board background polling
//! - [`events`] — typed observer events
//! - [`models`] — data models (Forum, Thread, Post, Vars)
//! - [`auth`] — credential encryption at rest
//! - [`config`] — configuration management
//!
//! ## Example
//!
//! ```no_run
//! use roost::{Board, ParserRegistry};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let registry = ParserRegistry::with_defaults();
//!
//! let mut board = Board::new("https://forum.example.com");
//! board.name = "Example Forum".to_string();
//! board.protocol = "demo".to_string();
//! board.username = "reader".to_string();
//!
//! board.connect(&registry)?;
//! board.login()?;
//! board.process_completion().await;
//! board.crawl_root(false).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::single_match_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::use_self)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]

pub mod auth;
pub mod board;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod manager;
pub mod models;
pub mod parser;
pub mod paths;
pub mod worker;

// Re-export main types for convenience
pub use board::{Board, BoardStatus, DEFAULT_REFRESH_RATE};
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use events::{BoardEvent, ManagerEvent};
pub use manager::{BoardHandle, BoardManager, board_handle};
pub use models::{Forum, ForumType, Post, Thread, Vars};
pub use parser::{LoginInfo, Parser, ParserError, ParserRegistry, PostListOption};
pub use worker::{UpdateWorker, WorkerHandle};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
