use crate::error::{CoreError, Result};
use crate::storage::Storage;
use crate::types::GameRecord;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

pub struct GameStore<'a> {
    storage: &'a Storage,
}

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<GameRecord> {
    Ok(GameRecord {
        id: row.get(0)?,
        alice: row.get(1)?,
        bob: row.get(2)?,
        config: row.get(3)?,
        started: row.get(4)?,
        deploy_outpoint: row.get(5)?,
        stake: row.get::<_, i64>(6)? as u64,
        created_at: chrono::DateTime::from_timestamp(row.get(7)?, 0)
            .unwrap_or_else(|| Utc::now()),
    })
}

impl<'a> GameStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn save_game(&self, game: &GameRecord) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO games
             (id, alice, bob, config, started, deploy_outpoint, stake, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                game.id,
                game.alice,
                game.bob,
                game.config,
                game.started,
                game.deploy_outpoint,
                game.stake as i64,
                game.created_at.timestamp(),
            ],
        )?;

        Ok(())
    }

    pub async fn load_game(&self, game_id: &str) -> Result<GameRecord> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, alice, bob, config, started, deploy_outpoint, stake, created_at
             FROM games WHERE id = ?1",
        )?;

        stmt.query_row(params![game_id], game_from_row)
            .optional()?
            .ok_or_else(|| CoreError::GameNotFound {
                id: game_id.to_string(),
            })
    }

    pub async fn list_games(&self) -> Result<Vec<GameRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, alice, bob, config, started, deploy_outpoint, stake, created_at
             FROM games ORDER BY created_at DESC",
        )?;

        let game_iter = stmt.query_map([], game_from_row)?;

        let mut games = Vec::new();
        for game in game_iter {
            games.push(game?);
        }

        Ok(games)
    }

    pub async fn mark_started(&self, game_id: &str) -> Result<()> {
        let conn = self.storage.get_connection().await;

        let updated = conn.execute(
            "UPDATE games SET started = 1 WHERE id = ?1",
            params![game_id],
        )?;
        if updated == 0 {
            return Err(CoreError::GameNotFound {
                id: game_id.to_string(),
            });
        }

        Ok(())
    }

    pub async fn delete_game(&self, game_id: &str) -> Result<()> {
        let conn = self.storage.get_connection().await;

        // Delete in order due to foreign key constraints
        conn.execute(
            "DELETE FROM pending_moves WHERE game_id = ?1",
            params![game_id],
        )?;
        conn.execute("DELETE FROM moves WHERE game_id = ?1", params![game_id])?;
        conn.execute("DELETE FROM games WHERE id = ?1", params![game_id])?;

        Ok(())
    }
}
