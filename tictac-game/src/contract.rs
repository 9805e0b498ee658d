//! The part of the on-chain contract instance the game reads and writes.
//!
//! Each step builds a brand-new `ContractState` from the participants and
//! the latest snapshot; nothing here is updated in place.

use crate::board::{Board, Player, CELLS};
use crate::error::Result;
use crate::history::GameHistory;

use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::{Amount, OutPoint, PublicKey, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};
use tictac_core::ledger::p2pkh_script;
use tictac_core::{ContractCode, CoreError};

const STATE_VERSION: u8 = 0;

/// The two fixed players of a game and their keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    pub alice: PublicKey,
    pub bob: PublicKey,
}

impl Participants {
    /// Both keys must be compressed: the contract state and the payout
    /// scripts use the 33-byte encoding.
    pub fn new(alice: PublicKey, bob: PublicKey) -> Result<Self> {
        for (name, key) in [("Alice", &alice), ("Bob", &bob)] {
            if !key.compressed {
                return Err(CoreError::bitcoin(format!(
                    "{}'s public key must be compressed",
                    name
                ))
                .into());
            }
        }
        Ok(Self { alice, bob })
    }

    pub fn key_of(&self, player: Player) -> &PublicKey {
        match player {
            Player::Alice => &self.alice,
            Player::Bob => &self.bob,
        }
    }

    pub fn payout_script(&self, player: Player) -> ScriptBuf {
        p2pkh_script(self.key_of(player))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractState {
    pub alice: PublicKey,
    pub bob: PublicKey,
    pub is_alice_turn: bool,
    /// 0 empty, 1 Alice, 2 Bob.
    pub board: [u8; CELLS],
}

impl ContractState {
    pub fn new(participants: &Participants, board: &Board, turn: Player) -> Self {
        Self {
            alice: participants.alice,
            bob: participants.bob,
            is_alice_turn: turn == Player::Alice,
            board: board.state_bytes(),
        }
    }

    pub fn from_history(participants: &Participants, history: &GameHistory) -> Self {
        Self::new(participants, history.current(), history.turn())
    }

    /// `alice ‖ bob ‖ turn ‖ board ‖ len:u32le ‖ version`
    pub fn serialize_state(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(33 * 2 + 1 + CELLS + 5);
        data.extend_from_slice(&self.alice.inner.serialize());
        data.extend_from_slice(&self.bob.inner.serialize());
        data.push(u8::from(self.is_alice_turn));
        data.extend_from_slice(&self.board);

        let len = data.len() as u32;
        data.extend_from_slice(&len.to_le_bytes());
        data.push(STATE_VERSION);
        data
    }

    /// Contract code, then `OP_RETURN`, then the pushed state.
    pub fn locking_script(&self, code: &ContractCode) -> ScriptBuf {
        // serialized state is 82 bytes, well under the push limit
        let state = PushBytesBuf::try_from(self.serialize_state())
            .unwrap_or_else(|_| PushBytesBuf::new());
        let tail = Builder::new()
            .push_opcode(OP_RETURN)
            .push_slice(state)
            .into_script();

        let mut bytes = code.as_bytes().to_vec();
        bytes.extend_from_slice(tail.as_bytes());
        ScriptBuf::from_bytes(bytes)
    }
}

/// The contract output currently holding the stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedOutput {
    pub outpoint: OutPoint,
    pub amount: Amount,
    pub state: ContractState,
}

/// What the caller needs to spend the re-locked output on the next move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    pub state: ContractState,
    pub output_index: u32,
    pub amount: Amount,
}

impl Continuation {
    pub fn into_locked(self, txid: Txid) -> LockedOutput {
        LockedOutput {
            outpoint: OutPoint::new(txid, self.output_index),
            amount: self.amount,
            state: self.state,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::board::tests::board;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};

    pub(crate) fn participants() -> Participants {
        let secp = Secp256k1::new();
        let key = |b: u8| {
            let sk = SecretKey::from_slice(&[b; 32]).unwrap();
            PublicKey::new(sk.public_key(&secp))
        };
        Participants::new(key(1), key(2)).unwrap()
    }

    #[test]
    fn test_state_layout() {
        let p = participants();
        let state = ContractState::new(&p, &board("X...O...."), Player::Alice);
        let data = state.serialize_state();

        assert_eq!(data.len(), 33 + 33 + 1 + 9 + 4 + 1);
        assert_eq!(&data[..33], &p.alice.inner.serialize());
        assert_eq!(data[66], 1);
        assert_eq!(&data[67..76], &[1, 0, 0, 0, 2, 0, 0, 0, 0]);
        assert_eq!(&data[76..80], &76u32.to_le_bytes());
        assert_eq!(data[80], STATE_VERSION);
    }

    #[test]
    fn test_locking_script_embeds_state_after_code() {
        let p = participants();
        let code = ContractCode::new(vec![0x61, 0x61]);
        let state = ContractState::new(&p, &Board::new(), Player::Alice);
        let script = state.locking_script(&code);
        let bytes = script.as_bytes();

        assert_eq!(&bytes[..2], &[0x61, 0x61]);
        assert_eq!(bytes[2], OP_RETURN.to_u8());
        assert!(bytes.ends_with(&state.serialize_state()));

        let moved = ContractState::new(&p, &board("X........"), Player::Bob);
        assert_ne!(moved.locking_script(&code), script);
    }

    #[test]
    fn test_payout_scripts_differ() {
        let p = participants();
        assert_ne!(p.payout_script(Player::Alice), p.payout_script(Player::Bob));
        assert!(p.payout_script(Player::Bob).is_p2pkh());
    }

    #[test]
    fn test_uncompressed_keys_rejected() {
        let p = participants();
        let mut uncompressed = p.bob;
        uncompressed.compressed = false;

        assert!(Participants::new(p.alice, uncompressed).is_err());
        assert!(Participants::new(uncompressed, p.bob).is_err());
    }
}
