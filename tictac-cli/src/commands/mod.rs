use bitcoin::{Amount, Txid};
use chrono::Utc;
use comfy_table::{presets::UTF8_FULL, Table};
use std::str::FromStr;
use tictac_core::ledger::{parse_address, parse_funding, parse_outpoint, parse_pubkey, tx_hex};
use tictac_core::{
    GameConfig, GameRecord, GameStore, MoveRecord, MoveStore, PendingMoveRecord, Storage,
};
use tictac_game::{GameSession, GameStatus, Participants, Player, SettlementPlan};
use uuid::Uuid;

type CmdResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

fn parse_game_id(game_id: &str) -> CmdResult<String> {
    Ok(Uuid::parse_str(game_id)?.to_string())
}

fn confirmed_moves(records: &[MoveRecord]) -> CmdResult<Vec<(usize, Txid)>> {
    records
        .iter()
        .map(|m| -> CmdResult<(usize, Txid)> { Ok((m.cell as usize, Txid::from_str(&m.txid)?)) })
        .collect()
}

/// Rebuilds a session from its stored record by replaying `moves`.
fn session_from(record: &GameRecord, moves: &[(usize, Txid)]) -> CmdResult<GameSession> {
    let participants = Participants::new(parse_pubkey(&record.alice)?, parse_pubkey(&record.bob)?)?;
    let config: GameConfig = serde_json::from_str(&record.config)?;

    Ok(GameSession::restore(
        Uuid::parse_str(&record.id)?,
        participants,
        parse_outpoint(&record.deploy_outpoint)?,
        Amount::from_sat(record.stake),
        config,
        record.started,
        moves,
    )?)
}

async fn load_session(storage: &Storage, game_id: &str) -> CmdResult<(GameSession, Vec<MoveRecord>)> {
    let record = GameStore::new(storage).load_game(game_id).await?;
    let records = MoveStore::new(storage).list_moves(game_id).await?;
    let session = session_from(&record, &confirmed_moves(&records)?)?;
    Ok((session, records))
}

fn describe(status: &GameStatus) -> String {
    match status {
        GameStatus::NotStarted => "Not started".to_string(),
        GameStatus::InProgress { next } => format!("{} ({}) to move", next, next.mark()),
        GameStatus::Won { winner, line } => format!("{} won on {:?}", winner, line),
        GameStatus::Draw => "Draw".to_string(),
    }
}

fn print_plan(plan: &SettlementPlan) {
    match plan {
        SettlementPlan::Continue { amount } => {
            println!("Game continues, {} sats re-locked", amount.to_sat());
        }
        SettlementPlan::WinnerPayout(payout) => {
            println!("{} wins {} sats", payout.player, payout.amount.to_sat());
        }
        SettlementPlan::DrawPayout { alice, bob } => {
            println!(
                "Draw: Alice gets {} sats, Bob gets {} sats",
                alice.amount.to_sat(),
                bob.amount.to_sat()
            );
        }
    }
}

pub async fn create_game(
    storage: &Storage,
    alice: &str,
    bob: &str,
    deploy: &str,
    stake: u64,
    config: GameConfig,
) -> CmdResult {
    let participants = Participants::new(parse_pubkey(alice)?, parse_pubkey(bob)?)?;
    let deploy = parse_outpoint(deploy)?;
    let session = tictac_game::create_game(
        participants.clone(),
        deploy,
        Amount::from_sat(stake),
        config.clone(),
    )?;

    let record = GameRecord {
        id: session.id().to_string(),
        alice: participants.alice.to_string(),
        bob: participants.bob.to_string(),
        config: serde_json::to_string(&config)?,
        started: false,
        deploy_outpoint: deploy.to_string(),
        stake,
        created_at: Utc::now(),
    };
    GameStore::new(storage).save_game(&record).await?;

    println!("Created game {}", record.id);
    println!("Contract output: {}", deploy);
    println!("Stake: {} sats", stake);
    println!("Network: {}", config.network);
    println!();
    println!("Start it with:");
    println!("tictactoe start {}", record.id);

    Ok(())
}

pub async fn start_game(storage: &Storage, game_id: &str) -> CmdResult {
    let game_id = parse_game_id(game_id)?;
    let store = GameStore::new(storage);
    let record = store.load_game(&game_id).await?;

    if record.started {
        println!("Game {} is already started", game_id);
        return Ok(());
    }

    store.mark_started(&game_id).await?;
    println!("Game {} started. Alice (X) moves first.", game_id);
    Ok(())
}

pub async fn prepare_move(
    storage: &Storage,
    game_id: &str,
    cell: usize,
    funding: &[String],
    change: &str,
) -> CmdResult {
    let game_id = parse_game_id(game_id)?;
    let (session, _) = load_session(storage, &game_id).await?;

    let change_script = parse_address(change, session.config().network)?.script_pubkey();
    let funding = funding
        .iter()
        .map(|f| parse_funding(f, &change_script))
        .collect::<Result<Vec<_>, _>>()?;

    let prepared = session.prepare_move(cell, &funding, &change_script)?;
    let unsigned = prepared.unsigned();

    let move_store = MoveStore::new(storage);
    if let Some(previous) = move_store.load_pending(&game_id).await? {
        println!(
            "Replacing pending move at cell {} for step {}",
            previous.cell, previous.step
        );
    }
    move_store
        .save_pending(&PendingMoveRecord {
            game_id: game_id.clone(),
            step: session.history().current_step() as u32,
            cell: cell as u8,
            raw_tx: tx_hex(&unsigned.tx),
            created_at: Utc::now(),
        })
        .await?;

    println!("{} plays cell {}", prepared.mover(), cell);
    print!("{}", prepared.board());
    print_plan(prepared.plan());
    println!("Fee: {} sats", unsigned.fee.to_sat());
    if let Some(continuation) = &unsigned.continuation {
        println!(
            "Next contract state: {}",
            hex::encode(continuation.state.serialize_state())
        );
    }
    println!();
    println!("Unsigned transaction (contract input {}):", unsigned.contract_input);
    println!("{}", tx_hex(&unsigned.tx));
    println!();
    println!("Once it is accepted, record it with:");
    println!("tictactoe confirm {} <txid>", game_id);

    Ok(())
}

pub async fn confirm_move(storage: &Storage, game_id: &str, txid: &str) -> CmdResult {
    let game_id = parse_game_id(game_id)?;
    let txid = Txid::from_str(txid)?;
    let move_store = MoveStore::new(storage);

    let pending = move_store
        .load_pending(&game_id)
        .await?
        .ok_or("No pending move for this game")?;
    let record = GameStore::new(storage).load_game(&game_id).await?;
    let records = move_store.list_moves(&game_id).await?;

    if pending.step as usize != records.len() {
        move_store.discard_pending(&game_id).await?;
        return Err(format!(
            "Pending move for step {} is stale, game is at step {}",
            pending.step,
            records.len()
        )
        .into());
    }

    // replaying with the new move re-checks its legality
    let mut moves = confirmed_moves(&records)?;
    moves.push((pending.cell as usize, txid));
    let session = session_from(&record, &moves)?;

    let player = Player::for_step(pending.step as usize);
    move_store
        .commit_move(&MoveRecord {
            game_id: game_id.clone(),
            step: pending.step,
            cell: pending.cell,
            player: player.to_string(),
            txid: txid.to_string(),
            created_at: Utc::now(),
        })
        .await?;

    println!("Confirmed {}'s move at cell {} in {}", player, pending.cell, txid);
    print!("{}", session.history().current());
    println!("Status: {}", describe(&session.status()));
    if let Some(settled) = session.settlement_txid() {
        println!("Stake settled in {}", settled);
    }

    Ok(())
}

pub async fn show_status(storage: &Storage, game_id: &str) -> CmdResult {
    let game_id = parse_game_id(game_id)?;
    let (session, _) = load_session(storage, &game_id).await?;
    let info = session.info();

    println!("Game: {}", info.id);
    println!("Status: {}", describe(&info.status));
    println!("Step: {}", info.step);
    println!();
    print!("{}", info.board);
    println!();

    match (info.locked_outpoint, info.locked_amount) {
        (Some(outpoint), Some(amount)) => {
            println!("Locked: {} sats at {}", amount.to_sat(), outpoint);
        }
        _ => println!("Locked: none"),
    }
    if let Some(txid) = info.settlement_txid {
        println!("Settlement: {}", txid);
    }
    if let Some(pending) = MoveStore::new(storage).load_pending(&game_id).await? {
        println!(
            "Pending: cell {} awaiting confirmation (prepared {})",
            pending.cell,
            pending.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

pub async fn show_history(storage: &Storage, game_id: &str, step: Option<usize>) -> CmdResult {
    let game_id = parse_game_id(game_id)?;
    let (mut session, records) = load_session(storage, &game_id).await?;

    if records.is_empty() {
        println!("No confirmed moves yet.");
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Step", "Player", "Cell", "Txid", "Time"]);

        for m in &records {
            table.add_row(vec![
                &(m.step + 1).to_string(),
                &m.player,
                &m.cell.to_string(),
                &m.txid,
                &m.created_at.format("%Y-%m-%d %H:%M").to_string(),
            ]);
        }

        println!("{}", table);
    }

    if let Some(step) = step {
        session.view_step(step)?;
        let view = session.history();
        println!();
        println!("Board at step {}:", step);
        print!("{}", view.current());
        println!("Turn: {}", view.turn());
    }

    Ok(())
}

pub async fn list_games(storage: &Storage) -> CmdResult {
    let games = GameStore::new(storage).list_games().await?;

    if games.is_empty() {
        println!("No games found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Game ID", "Stake (sats)", "Step", "Status", "Created"]);

    for game in games {
        let (step, status) = match load_session(storage, &game.id).await {
            Ok((session, _)) => (
                session.history().current_step().to_string(),
                describe(&session.status()),
            ),
            Err(e) => {
                tracing::warn!("Could not restore game {}: {}", game.id, e);
                ("?".to_string(), "Unreadable".to_string())
            }
        };

        table.add_row(vec![
            &game.id,
            &game.stake.to_string(),
            &step,
            &status,
            &game.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }

    println!("{}", table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::{Address, Network, PublicKey};
    use tempfile::TempDir;

    fn key(b: u8) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey::new(SecretKey::from_slice(&[b; 32]).unwrap().public_key(&secp))
    }

    fn txid(n: u8) -> String {
        format!("{:02x}", n).repeat(32)
    }

    async fn setup() -> (TempDir, Storage, String) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(&dir.path().join("games.db")).await.unwrap();

        create_game(
            &storage,
            &key(1).to_string(),
            &key(2).to_string(),
            &format!("{}:0", txid(0xde)),
            10_000,
            GameConfig::default(),
        )
        .await
        .unwrap();
        let id = GameStore::new(&storage).list_games().await.unwrap()[0].id.clone();
        start_game(&storage, &id).await.unwrap();

        (dir, storage, id)
    }

    fn change_address() -> String {
        Address::p2pkh(key(1).pubkey_hash(), Network::Regtest).to_string()
    }

    async fn play(storage: &Storage, id: &str, cell: usize, n: u8) {
        let funding = vec![format!("{}:1:50000", txid(0xfe))];
        prepare_move(storage, id, cell, &funding, &change_address())
            .await
            .unwrap();
        confirm_move(storage, id, &txid(n)).await.unwrap();
    }

    #[tokio::test]
    async fn test_confirmed_moves_restore_session() {
        let (_dir, storage, id) = setup().await;

        play(&storage, &id, 4, 1).await;
        play(&storage, &id, 0, 2).await;

        let (session, records) = load_session(&storage, &id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].player, "Bob");
        assert_eq!(session.history().current_step(), 2);
        assert_eq!(
            session.locked().unwrap().outpoint.to_string(),
            format!("{}:0", txid(2))
        );
        assert!(MoveStore::new(&storage).load_pending(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_illegal_move_is_not_stored() {
        let (_dir, storage, id) = setup().await;
        play(&storage, &id, 4, 1).await;

        let funding = vec![format!("{}:1:50000", txid(0xfe))];
        assert!(prepare_move(&storage, &id, 4, &funding, &change_address())
            .await
            .is_err());
        assert!(MoveStore::new(&storage).load_pending(&id).await.unwrap().is_none());
        assert!(confirm_move(&storage, &id, &txid(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_winning_move_settles() {
        let (_dir, storage, id) = setup().await;
        for (n, cell) in [0, 1, 4, 2, 8].into_iter().enumerate() {
            play(&storage, &id, cell, n as u8 + 1).await;
        }

        let (session, _) = load_session(&storage, &id).await.unwrap();
        assert!(session.locked().is_none());
        assert_eq!(
            session.status(),
            GameStatus::Won {
                winner: Player::Alice,
                line: [0, 4, 8]
            }
        );
    }
}
