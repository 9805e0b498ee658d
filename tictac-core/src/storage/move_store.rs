use crate::error::{CoreError, Result};
use crate::storage::Storage;
use crate::types::{MoveRecord, PendingMoveRecord};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

pub struct MoveStore<'a> {
    storage: &'a Storage,
}

impl<'a> MoveStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Confirmed moves of a game in step order.
    pub async fn list_moves(&self, game_id: &str) -> Result<Vec<MoveRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT game_id, step, cell, player, txid, created_at
             FROM moves WHERE game_id = ?1 ORDER BY step ASC",
        )?;

        let move_iter = stmt.query_map(params![game_id], |row| {
            Ok(MoveRecord {
                game_id: row.get(0)?,
                step: row.get(1)?,
                cell: row.get(2)?,
                player: row.get(3)?,
                txid: row.get(4)?,
                created_at: chrono::DateTime::from_timestamp(row.get(5)?, 0)
                    .unwrap_or_else(|| Utc::now()),
            })
        })?;

        let mut moves = Vec::new();
        for record in move_iter {
            moves.push(record?);
        }

        Ok(moves)
    }

    /// Stage a move whose transaction has been handed out for signing.
    /// A later stage for the same game replaces it.
    pub async fn save_pending(&self, pending: &PendingMoveRecord) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO pending_moves (game_id, step, cell, raw_tx, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                pending.game_id,
                pending.step,
                pending.cell,
                pending.raw_tx,
                pending.created_at.timestamp(),
            ],
        )?;

        Ok(())
    }

    pub async fn load_pending(&self, game_id: &str) -> Result<Option<PendingMoveRecord>> {
        let conn = self.storage.get_connection().await;

        let pending = conn
            .query_row(
                "SELECT game_id, step, cell, raw_tx, created_at
                 FROM pending_moves WHERE game_id = ?1",
                params![game_id],
                |row| {
                    Ok(PendingMoveRecord {
                        game_id: row.get(0)?,
                        step: row.get(1)?,
                        cell: row.get(2)?,
                        raw_tx: row.get(3)?,
                        created_at: chrono::DateTime::from_timestamp(row.get(4)?, 0)
                            .unwrap_or_else(|| Utc::now()),
                    })
                },
            )
            .optional()?;

        Ok(pending)
    }

    pub async fn discard_pending(&self, game_id: &str) -> Result<()> {
        let conn = self.storage.get_connection().await;
        conn.execute(
            "DELETE FROM pending_moves WHERE game_id = ?1",
            params![game_id],
        )?;
        Ok(())
    }

    /// Append a confirmed move and drop the pending stage in one transaction.
    /// Steps must arrive in order with no gaps.
    pub async fn commit_move(&self, record: &MoveRecord) -> Result<()> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        let next_step: u32 = tx.query_row(
            "SELECT COUNT(*) FROM moves WHERE game_id = ?1",
            params![record.game_id],
            |row| row.get(0),
        )?;
        if record.step != next_step {
            return Err(CoreError::internal(format!(
                "Move step {} out of order for game {}, expected {}",
                record.step, record.game_id, next_step
            )));
        }

        tx.execute(
            "INSERT INTO moves (game_id, step, cell, player, txid, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.game_id,
                record.step,
                record.cell,
                record.player,
                record.txid,
                record.created_at.timestamp(),
            ],
        )?;
        tx.execute(
            "DELETE FROM pending_moves WHERE game_id = ?1",
            params![record.game_id],
        )?;
        tx.commit()?;

        tracing::info!(
            "Recorded move {} of game {}: cell {} ({})",
            record.step,
            record.game_id,
            record.cell,
            record.txid
        );
        Ok(())
    }
}
