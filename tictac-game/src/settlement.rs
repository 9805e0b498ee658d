use crate::board::{Board, Player};
use crate::contract::Participants;
use crate::error::{GameError, Result};
use crate::outcome::has_won;

use bitcoin::{Amount, ScriptBuf};
use serde::{Deserialize, Serialize};

/// A payment to one participant's P2PKH address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub player: Player,
    pub script_pubkey: ScriptBuf,
    pub amount: Amount,
}

/// What happens to the locked balance after a move. Always recomputed from
/// the snapshot and balance, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementPlan {
    /// Re-lock the whole balance under the next contract state.
    Continue { amount: Amount },
    /// The mover completed a line and takes everything.
    WinnerPayout(Payout),
    /// Full board, no line: Alice gets the floor half, Bob the rest.
    DrawPayout { alice: Payout, bob: Payout },
}

impl SettlementPlan {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SettlementPlan::Continue { .. })
    }

    /// Payouts in output order.
    pub fn payouts(&self) -> Vec<&Payout> {
        match self {
            SettlementPlan::Continue { .. } => Vec::new(),
            SettlementPlan::WinnerPayout(payout) => vec![payout],
            SettlementPlan::DrawPayout { alice, bob } => vec![alice, bob],
        }
    }

    /// Sum of all payout and continuation amounts.
    pub fn allocated(&self) -> Amount {
        match self {
            SettlementPlan::Continue { amount } => *amount,
            _ => self
                .payouts()
                .iter()
                .fold(Amount::ZERO, |acc, p| acc + p.amount),
        }
    }

    pub fn ensure_balanced(&self, locked: Amount) -> Result<()> {
        let allocated = self.allocated();
        if allocated != locked {
            return Err(GameError::SettlementImbalance { allocated, locked });
        }
        Ok(())
    }
}

/// Decide the payout policy for the snapshot produced by `mover`'s move.
pub fn plan(
    board: &Board,
    locked: Amount,
    mover: Player,
    participants: &Participants,
) -> SettlementPlan {
    let plan = if has_won(board, mover) {
        SettlementPlan::WinnerPayout(Payout {
            player: mover,
            script_pubkey: participants.payout_script(mover),
            amount: locked,
        })
    } else if board.is_full() {
        let half = Amount::from_sat(locked.to_sat() / 2);
        SettlementPlan::DrawPayout {
            alice: Payout {
                player: Player::Alice,
                script_pubkey: participants.payout_script(Player::Alice),
                amount: half,
            },
            bob: Payout {
                player: Player::Bob,
                script_pubkey: participants.payout_script(Player::Bob),
                amount: locked - half,
            },
        }
    } else {
        SettlementPlan::Continue { amount: locked }
    };

    tracing::debug!(
        mover = %mover,
        locked = locked.to_sat(),
        terminal = plan.is_terminal(),
        "Planned settlement"
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::board;
    use crate::contract::tests::participants;

    #[test]
    fn test_continue_keeps_balance() {
        let p = participants();
        let locked = Amount::from_sat(10_000);
        let plan = plan(&board("O...X...X"), locked, Player::Alice, &p);

        assert_eq!(plan, SettlementPlan::Continue { amount: locked });
        assert!(!plan.is_terminal());
        assert!(plan.ensure_balanced(locked).is_ok());
    }

    #[test]
    fn test_winner_takes_all() {
        let p = participants();
        let locked = Amount::from_sat(10_000);
        let plan = plan(&board("XOO.X...X"), locked, Player::Alice, &p);

        match &plan {
            SettlementPlan::WinnerPayout(payout) => {
                assert_eq!(payout.player, Player::Alice);
                assert_eq!(payout.script_pubkey, p.payout_script(Player::Alice));
                assert_eq!(payout.amount, locked);
            }
            other => panic!("expected winner payout, got {:?}", other),
        }
        assert!(plan.ensure_balanced(locked).is_ok());
    }

    #[test]
    fn test_draw_split_odd_balance() {
        let p = participants();
        let locked = Amount::from_sat(1001);
        let plan = plan(&board("XOXXOOOXX"), locked, Player::Alice, &p);

        match &plan {
            SettlementPlan::DrawPayout { alice, bob } => {
                assert_eq!(alice.amount, Amount::from_sat(500));
                assert_eq!(bob.amount, Amount::from_sat(501));
                assert_eq!(bob.script_pubkey, p.payout_script(Player::Bob));
            }
            other => panic!("expected draw, got {:?}", other),
        }
        assert_eq!(plan.allocated(), locked);
    }

    #[test]
    fn test_allocation_always_matches_locked() {
        let p = participants();
        let boards = [board("X........"), board("XOO.X...X"), board("XOXXOOOXX")];
        for sats in [0u64, 1, 2, 999, 1001, 21_000_000] {
            let locked = Amount::from_sat(sats);
            for b in &boards {
                let plan = plan(b, locked, Player::Alice, &p);
                assert_eq!(plan.allocated(), locked);
            }
        }
    }

    #[test]
    fn test_imbalance_detected() {
        let plan = SettlementPlan::Continue {
            amount: Amount::from_sat(99),
        };
        assert!(matches!(
            plan.ensure_balanced(Amount::from_sat(100)),
            Err(GameError::SettlementImbalance { .. })
        ));
    }
}
