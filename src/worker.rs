//! Per-board background polling
//!
//! Each board gets one worker task that refreshes the unread-forum list
//! and periodically verifies the stored forum structure against the
//! server. The loop sleeps `refreshRate` seconds *after* each cycle
//! finishes, so a slow cycle naturally throttles the polling cadence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::board::Board;
use crate::error::Result;
use crate::manager::{BoardHandle, BoardManager};

/// Seconds between structure-drift checks per board: one day
const STRUCTURE_CHECK_PERIOD_SECS: i64 = 60 * 60 * 24;

/// Background updater for a single board
pub struct UpdateWorker {
    board: BoardHandle,
    manager: Arc<BoardManager>,
    work_lock: Arc<tokio::sync::Mutex<()>>,
}

/// Handle to a spawned worker loop
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop the loop and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

impl UpdateWorker {
    /// Create a worker for one board
    pub fn new(board: BoardHandle, manager: Arc<BoardManager>) -> Self {
        Self {
            board,
            manager,
            work_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Run the polling loop until shut down
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            loop {
                self.tick().await;

                let refresh = { self.board.lock().await.refresh_rate() };
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(refresh.max(1))) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        WorkerHandle { shutdown, join }
    }

    /// One update cycle.
    ///
    /// The work lock is taken non-blocking: if a previous cycle is still
    /// running, this tick is skipped outright rather than queued, so slow
    /// network calls can never build a backlog.
    pub async fn tick(&self) {
        let Ok(_guard) = self.work_lock.try_lock() else {
            tracing::trace!("updater is still running, skipping this round");
            return;
        };

        let mut board = self.board.lock().await;
        if !board.enabled {
            return;
        }

        tracing::debug!("update cycle for board '{}'", board.name);
        board.update_unread().await;

        if let Err(e) = Self::check_structure_update(&mut board, &self.manager).await {
            tracing::error!("error during update cycle for '{}': {e}", board.name);
        }
    }

    /// Compare the server's current structure against the live tree, at
    /// most once per day per board. On drift, observers get a
    /// [`BoardEvent::StructureChanged`](crate::events::BoardEvent) and are
    /// expected to remove and re-add the board; no incremental
    /// reconciliation is attempted.
    async fn check_structure_update(board: &mut Board, manager: &BoardManager) -> Result<()> {
        let elapsed = Utc::now() - board.last_update();
        if elapsed.num_seconds() < STRUCTURE_CHECK_PERIOD_SECS {
            tracing::trace!(
                "board '{}' last verified {} ago, not due",
                board.name,
                elapsed
            );
            return Ok(());
        }

        tracing::debug!("verifying forum structure for '{}'", board.name);

        let Some(saved) = manager.board_info(board.db_id())? else {
            tracing::warn!("board '{}' has no stored row, skipping check", board.name);
            return Ok(());
        };
        if saved.root().is_none() {
            tracing::warn!("board '{}' has no stored structure", board.name);
            return Ok(());
        }

        // fetched strictly: a partial crawl must not read as drift
        let fresh = match board.get_root_structure(true).await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!("structure fetch for '{}' failed: {e}", board.name);
                return Ok(());
            }
        };

        match board.root() {
            Some(live) if live.is_structure_equal(&fresh) => {
                tracing::trace!("board '{}': stored and online structure match", board.name);
            }
            Some(_) => {
                tracing::debug!(
                    "board '{}': stored and online structure differ",
                    board.name
                );
                board.emit_structure_changed();
            }
            None => {
                tracing::warn!("board '{}' has no live structure to compare", board.name);
            }
        }

        board.set_last_update(Utc::now());
        manager.update_board(board)?;

        Ok(())
    }
}
