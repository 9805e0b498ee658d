use crate::board::{Board, Player};
use crate::builder::{TxBuilder, UnsignedMove, CONTINUATION_OUTPUT, CONTRACT_INPUT};
use crate::contract::{ContractState, LockedOutput, Participants};
use crate::error::{GameError, Result};
use crate::history::{GameHistory, PendingMove};
use crate::settlement::{self, SettlementPlan};

use bitcoin::{Amount, OutPoint, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};
use tictac_core::signer::{Broadcaster, SignatureSelector, Signer};
use tictac_core::{ContractCode, FundingUtxo, GameConfig};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    NotStarted,
    InProgress { next: Player },
    Won { winner: Player, line: [usize; 3] },
    Draw,
}

/// A move computed against the current state, waiting for signature and
/// broadcast. Dropping it abandons the move.
#[derive(Debug, Clone)]
pub struct PreparedMove {
    pending: PendingMove,
    prior: OutPoint,
    plan: SettlementPlan,
    unsigned: UnsignedMove,
}

impl PreparedMove {
    pub fn cell(&self) -> usize {
        self.pending.cell()
    }

    pub fn mover(&self) -> Player {
        self.pending.mover()
    }

    pub fn board(&self) -> &Board {
        self.pending.board()
    }

    pub fn plan(&self) -> &SettlementPlan {
        &self.plan
    }

    pub fn unsigned(&self) -> &UnsignedMove {
        &self.unsigned
    }
}

/// Result of a move that made it on chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveReceipt {
    pub txid: Txid,
    pub cell: usize,
    pub player: Player,
    pub plan: SettlementPlan,
}

/// One staked game: its confirmed history and the contract output that
/// currently holds the stake.
#[derive(Debug, Clone)]
pub struct GameSession {
    id: Uuid,
    participants: Participants,
    config: GameConfig,
    code: ContractCode,
    history: GameHistory,
    locked: Option<LockedOutput>,
    settlement_txid: Option<Txid>,
}

impl GameSession {
    /// Session for a freshly deployed contract output holding `stake`.
    pub fn new(
        id: Uuid,
        participants: Participants,
        deploy: OutPoint,
        stake: Amount,
        config: GameConfig,
    ) -> Result<Self> {
        if stake > Amount::MAX_MONEY {
            return Err(GameError::StakeTooLarge(stake));
        }
        config.validate()?;
        let code = config.contract_code()?;
        let history = GameHistory::new();
        let state = ContractState::from_history(&participants, &history);

        Ok(Self {
            id,
            participants,
            config,
            code,
            history,
            locked: Some(LockedOutput {
                outpoint: deploy,
                amount: stake,
                state,
            }),
            settlement_txid: None,
        })
    }

    /// Rebuilds a session by replaying confirmed moves in order.
    pub fn restore(
        id: Uuid,
        participants: Participants,
        deploy: OutPoint,
        stake: Amount,
        config: GameConfig,
        started: bool,
        moves: &[(usize, Txid)],
    ) -> Result<Self> {
        let mut session = Self::new(id, participants, deploy, stake, config)?;
        if started {
            session.start();
        }

        for &(cell, txid) in moves {
            let pending = session.history.apply_move(cell)?;
            session.advance(pending, txid);
        }
        session.history.audit()?;

        tracing::debug!(
            "Restored game {} at step {}",
            session.id,
            session.history.current_step()
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn participants(&self) -> &Participants {
        &self.participants
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn history(&self) -> &GameHistory {
        &self.history
    }

    pub fn locked(&self) -> Option<&LockedOutput> {
        self.locked.as_ref()
    }

    pub fn settlement_txid(&self) -> Option<Txid> {
        self.settlement_txid
    }

    pub fn start(&mut self) {
        if !self.history.is_started() {
            self.history = self.history.start();
            tracing::info!("Game {} started", self.id);
        }
    }

    /// Moves the history pointer to `step` for replay. Moves are refused
    /// until the pointer is back at the latest step.
    pub fn view_step(&mut self, step: usize) -> Result<()> {
        self.history = self.history.jump_to(step)?;
        Ok(())
    }

    pub fn status(&self) -> GameStatus {
        let outcome = self.history.outcome();
        match (outcome.winner, outcome.line) {
            (Some(winner), Some(line)) => GameStatus::Won { winner, line },
            _ if self.history.current().is_full() => GameStatus::Draw,
            _ if !self.history.is_started() => GameStatus::NotStarted,
            _ => GameStatus::InProgress {
                next: self.history.turn(),
            },
        }
    }

    /// Apply, plan and build a move without touching the session.
    pub fn prepare_move(
        &self,
        cell: usize,
        funding: &[FundingUtxo],
        change_script: &ScriptBuf,
    ) -> Result<PreparedMove> {
        if self.history.is_rewound() {
            return Err(GameError::Rewound {
                step: self.history.current_step(),
            });
        }

        let pending = self.history.apply_move(cell).inspect_err(|e| {
            tracing::warn!("Game {} rejected move at cell {}: {}", self.id, cell, e);
        })?;
        let prior = self.locked.as_ref().ok_or(GameError::AlreadySettled)?;

        let plan = settlement::plan(
            pending.board(),
            prior.amount,
            pending.mover(),
            &self.participants,
        );
        let next_state = ContractState::from_history(&self.participants, pending.history());
        let unsigned = TxBuilder::new(&self.code, &self.config.fee_policy).build(
            &plan,
            prior,
            &next_state,
            funding,
            change_script,
        )?;

        Ok(PreparedMove {
            pending,
            prior: prior.outpoint,
            plan,
            unsigned,
        })
    }

    /// Commit a prepared move once its transaction `txid` is accepted.
    pub fn commit(&mut self, prepared: PreparedMove, txid: Txid) -> Result<()> {
        let current = self.locked.as_ref().map(|l| l.outpoint);
        if current != Some(prepared.prior)
            || prepared.pending.history().current_step() != self.history.current_step() + 1
        {
            return Err(GameError::internal(format!(
                "Prepared move no longer matches game {}",
                self.id
            )));
        }

        let PreparedMove {
            pending,
            plan,
            unsigned,
            ..
        } = prepared;
        let (cell, mover) = (pending.cell(), pending.mover());

        self.history = pending.confirm(txid);
        self.locked = unsigned.continuation.map(|c| c.into_locked(txid));
        if plan.is_terminal() {
            self.settlement_txid = Some(txid);
        }

        tracing::info!(
            "Game {}: {} played cell {} in {}{}",
            self.id,
            mover,
            cell,
            txid,
            if plan.is_terminal() { " (settled)" } else { "" }
        );
        Ok(())
    }

    /// Full move pipeline against the external signer and broadcaster.
    ///
    /// The session only advances after the broadcaster returns a txid; any
    /// failure before that leaves it at the last confirmed step.
    pub async fn play(
        &mut self,
        cell: usize,
        signer: &dyn Signer,
        broadcaster: &dyn Broadcaster,
        selector: &dyn SignatureSelector,
    ) -> Result<MoveReceipt> {
        let change_script = signer
            .default_address()
            .await
            .map_err(|e| GameError::external(e.to_string()))?
            .script_pubkey();
        let funding = signer
            .funding_utxos()
            .await
            .map_err(|e| GameError::external(e.to_string()))?;

        let prepared = self.prepare_move(cell, &funding, &change_script)?;

        let candidates = signer
            .sign_move(&prepared.unsigned.tx, CONTRACT_INPUT)
            .await
            .map_err(|e| GameError::external(e.to_string()))?;
        let mover = prepared.mover();
        let authorization = selector
            .select(self.participants.key_of(mover), &candidates)
            .ok_or_else(|| GameError::external(format!("No signature from {}'s key", mover)))?;

        let txid = broadcaster
            .broadcast(&prepared.unsigned.tx, &authorization)
            .await
            .map_err(|e| GameError::external(e.to_string()))?;

        let receipt = MoveReceipt {
            txid,
            cell,
            player: mover,
            plan: prepared.plan.clone(),
        };
        self.commit(prepared, txid)?;
        Ok(receipt)
    }

    /// Same bookkeeping as `commit`, derived from the history alone.
    fn advance(&mut self, pending: PendingMove, txid: Txid) {
        let amount = self.locked.as_ref().map_or(Amount::ZERO, |l| l.amount);
        self.history = pending.confirm(txid);

        if self.history.is_over() {
            self.locked = None;
            self.settlement_txid = Some(txid);
        } else {
            self.locked = Some(LockedOutput {
                outpoint: OutPoint::new(txid, CONTINUATION_OUTPUT),
                amount,
                state: ContractState::from_history(&self.participants, &self.history),
            });
        }
    }

    pub fn info(&self) -> GameInfo {
        GameInfo {
            id: self.id,
            status: self.status(),
            step: self.history.current_step(),
            board: self.history.current().to_string(),
            locked_outpoint: self.locked.as_ref().map(|l| l.outpoint),
            locked_amount: self.locked.as_ref().map(|l| l.amount),
            settlement_txid: self.settlement_txid,
        }
    }
}

/// Game info for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInfo {
    pub id: Uuid,
    pub status: GameStatus,
    pub step: usize,
    pub board: String,
    pub locked_outpoint: Option<OutPoint>,
    pub locked_amount: Option<Amount>,
    pub settlement_txid: Option<Txid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::tests::participants;
    use crate::error::MoveError;
    use async_trait::async_trait;
    use bitcoin::{Address, Network, PublicKey, Transaction};
    use parking_lot::Mutex;
    use std::str::FromStr;
    use tictac_core::signer::{FindSig, SignatureResponse};
    use tictac_core::CoreError;

    fn txid(n: u8) -> Txid {
        Txid::from_str(&format!("{:02x}", n).repeat(32)).unwrap()
    }

    fn new_session(stake: u64) -> GameSession {
        GameSession::new(
            Uuid::new_v4(),
            participants(),
            OutPoint::new(txid(0xde), 0),
            Amount::from_sat(stake),
            GameConfig::default(),
        )
        .unwrap()
    }

    /// Holds both players' keys and signs with each of them.
    struct FakeSigner {
        keys: Vec<PublicKey>,
        fail: bool,
    }

    #[async_trait]
    impl Signer for FakeSigner {
        async fn default_address(&self) -> tictac_core::Result<Address> {
            Ok(Address::p2pkh(self.keys[0].pubkey_hash(), Network::Regtest))
        }

        async fn funding_utxos(&self) -> tictac_core::Result<Vec<FundingUtxo>> {
            Ok(vec![FundingUtxo {
                outpoint: OutPoint::new(txid(0xfe), 0),
                amount: Amount::from_sat(50_000),
                script_pubkey: ScriptBuf::new(),
            }])
        }

        async fn sign_move(
            &self,
            _tx: &Transaction,
            input_index: usize,
        ) -> tictac_core::Result<Vec<SignatureResponse>> {
            if self.fail {
                return Err(CoreError::signer("device unplugged"));
            }
            Ok(self
                .keys
                .iter()
                .enumerate()
                .map(|(i, key)| SignatureResponse {
                    input_index,
                    pubkey: *key,
                    signature: vec![i as u8],
                })
                .collect())
        }
    }

    /// Hands out sequential txids and remembers what it was asked to send.
    struct FakeBroadcaster {
        sent: Mutex<Vec<(Transaction, SignatureResponse)>>,
        fail: bool,
    }

    impl FakeBroadcaster {
        fn new(fail: bool) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl Broadcaster for FakeBroadcaster {
        async fn broadcast(
            &self,
            tx: &Transaction,
            authorization: &SignatureResponse,
        ) -> tictac_core::Result<Txid> {
            if self.fail {
                return Err(CoreError::broadcast("mempool rejected"));
            }
            let mut sent = self.sent.lock();
            sent.push((tx.clone(), authorization.clone()));
            Ok(txid(sent.len() as u8))
        }
    }

    fn signer() -> FakeSigner {
        let p = participants();
        FakeSigner {
            keys: vec![p.alice, p.bob],
            fail: false,
        }
    }

    #[tokio::test]
    async fn test_moves_chain_through_continuations() {
        let mut session = new_session(10_000);
        session.start();
        let signer = signer();
        let broadcaster = FakeBroadcaster::new(false);

        for cell in [4, 0, 8] {
            let receipt = session
                .play(cell, &signer, &broadcaster, &FindSig)
                .await
                .unwrap();
            assert!(!receipt.plan.is_terminal());
        }

        let locked = session.locked().unwrap();
        assert_eq!(locked.outpoint, OutPoint::new(txid(3), 0));
        assert_eq!(locked.amount, Amount::from_sat(10_000));
        assert_eq!(locked.state.board, [2, 0, 0, 0, 1, 0, 0, 0, 1]);
        assert!(!locked.state.is_alice_turn);

        // each move spends the previous contract output
        let sent = broadcaster.sent.lock();
        assert_eq!(sent[1].0.input[0].previous_output, OutPoint::new(txid(1), 0));
        assert_eq!(sent[2].0.input[0].previous_output, OutPoint::new(txid(2), 0));
        // the mover's signature was selected
        assert_eq!(sent[0].1.pubkey, participants().alice);
        assert_eq!(sent[1].1.pubkey, participants().bob);
        assert_eq!(session.status(), GameStatus::InProgress { next: Player::Bob });
    }

    #[tokio::test]
    async fn test_win_settles_and_stops() {
        let mut session = new_session(10_000);
        session.start();
        let signer = signer();
        let broadcaster = FakeBroadcaster::new(false);

        let mut last = None;
        for cell in [0, 1, 4, 2, 8] {
            last = Some(
                session
                    .play(cell, &signer, &broadcaster, &FindSig)
                    .await
                    .unwrap(),
            );
        }

        let receipt = last.unwrap();
        match &receipt.plan {
            SettlementPlan::WinnerPayout(payout) => {
                assert_eq!(payout.player, Player::Alice);
                assert_eq!(payout.amount, Amount::from_sat(10_000));
            }
            other => panic!("expected winner payout, got {:?}", other),
        }
        assert!(session.locked().is_none());
        assert_eq!(session.settlement_txid(), Some(receipt.txid));
        assert_eq!(
            session.status(),
            GameStatus::Won {
                winner: Player::Alice,
                line: [0, 4, 8]
            }
        );

        let before = session.history().clone();
        let err = session
            .play(3, &signer, &broadcaster, &FindSig)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Move(MoveError::GameOver)));
        assert_eq!(session.history(), &before);
        assert_eq!(session.history().turn(), Player::Alice);
    }

    #[tokio::test]
    async fn test_draw_splits_stake() {
        let mut session = new_session(1001);
        session.start();
        let signer = signer();
        let broadcaster = FakeBroadcaster::new(false);

        let mut last = None;
        for cell in [0, 1, 2, 4, 3, 5, 7, 6, 8] {
            last = Some(
                session
                    .play(cell, &signer, &broadcaster, &FindSig)
                    .await
                    .unwrap(),
            );
        }

        match last.unwrap().plan {
            SettlementPlan::DrawPayout { alice, bob } => {
                assert_eq!(alice.amount, Amount::from_sat(500));
                assert_eq!(bob.amount, Amount::from_sat(501));
            }
            other => panic!("expected draw, got {:?}", other),
        }
        assert_eq!(session.status(), GameStatus::Draw);
        assert!(session.history().audit().is_ok());
    }

    #[tokio::test]
    async fn test_not_started_rejected() {
        let mut session = new_session(10_000);
        let broadcaster = FakeBroadcaster::new(false);

        let err = session
            .play(4, &signer(), &broadcaster, &FindSig)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Move(MoveError::NotStarted)));
        assert_eq!(session.history().snapshot_count(), 1);
        assert_eq!(session.status(), GameStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_external_failures_leave_session_untouched() {
        let mut session = new_session(10_000);
        session.start();

        let failing_signer = FakeSigner {
            fail: true,
            ..signer()
        };
        let err = session
            .play(4, &failing_signer, &FakeBroadcaster::new(false), &FindSig)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ExternalSigning(_)));

        let err = session
            .play(4, &signer(), &FakeBroadcaster::new(true), &FindSig)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ExternalSigning(_)));

        // signer without Alice's key cannot authorize her move
        let bob_only = FakeSigner {
            keys: vec![participants().bob],
            fail: false,
        };
        let err = session
            .play(4, &bob_only, &FakeBroadcaster::new(false), &FindSig)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ExternalSigning(_)));

        assert_eq!(session.history().snapshot_count(), 1);
        assert_eq!(session.locked().unwrap().outpoint, OutPoint::new(txid(0xde), 0));
    }

    #[test]
    fn test_stale_prepared_move_is_refused() {
        let mut session = new_session(10_000);
        session.start();
        let funding = vec![FundingUtxo {
            outpoint: OutPoint::new(txid(0xfe), 0),
            amount: Amount::from_sat(50_000),
            script_pubkey: ScriptBuf::new(),
        }];

        let first = session.prepare_move(4, &funding, &ScriptBuf::new()).unwrap();
        let second = session.prepare_move(0, &funding, &ScriptBuf::new()).unwrap();

        session.commit(first, txid(1)).unwrap();
        assert!(session.commit(second, txid(2)).is_err());
        assert_eq!(session.history().current_step(), 1);
    }

    #[test]
    fn test_restore_replays_confirmed_moves() {
        let p = participants();
        let moves = [(4, txid(1)), (0, txid(2)), (8, txid(3))];
        let session = GameSession::restore(
            Uuid::new_v4(),
            p,
            OutPoint::new(txid(0xde), 0),
            Amount::from_sat(10_000),
            GameConfig::default(),
            true,
            &moves,
        )
        .unwrap();

        assert_eq!(session.history().current_step(), 3);
        assert_eq!(session.locked().unwrap().outpoint, OutPoint::new(txid(3), 0));

        let illegal = GameSession::restore(
            Uuid::new_v4(),
            participants(),
            OutPoint::new(txid(0xde), 0),
            Amount::from_sat(10_000),
            GameConfig::default(),
            true,
            &[(4, txid(1)), (4, txid(2))],
        );
        assert!(matches!(
            illegal,
            Err(GameError::Move(MoveError::IllegalCell(4)))
        ));
    }

    #[test]
    fn test_rewound_session_refuses_moves() {
        let mut session = new_session(10_000);
        session.start();
        let funding = vec![FundingUtxo {
            outpoint: OutPoint::new(txid(0xfe), 0),
            amount: Amount::from_sat(50_000),
            script_pubkey: ScriptBuf::new(),
        }];
        let prepared = session.prepare_move(4, &funding, &ScriptBuf::new()).unwrap();
        session.commit(prepared, txid(1)).unwrap();

        session.view_step(0).unwrap();
        assert_eq!(session.history().current(), &Board::new());
        assert!(matches!(
            session.prepare_move(0, &funding, &ScriptBuf::new()),
            Err(GameError::Rewound { step: 0 })
        ));
        assert!(matches!(
            session.view_step(5),
            Err(GameError::History(_))
        ));

        session.view_step(1).unwrap();
        assert!(session.prepare_move(0, &funding, &ScriptBuf::new()).is_ok());
    }

    #[test]
    fn test_stake_above_money_supply_rejected() {
        let result = GameSession::new(
            Uuid::new_v4(),
            participants(),
            OutPoint::new(txid(0xde), 0),
            Amount::MAX_MONEY + Amount::from_sat(1),
            GameConfig::default(),
        );
        assert!(matches!(result, Err(GameError::StakeTooLarge(_))));

        assert!(GameSession::new(
            Uuid::new_v4(),
            participants(),
            OutPoint::new(txid(0xde), 0),
            Amount::MAX_MONEY,
            GameConfig::default(),
        )
        .is_ok());
    }
}
