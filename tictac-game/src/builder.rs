//! Assembles the unsigned transaction that carries one move.
//!
//! Input 0 always spends the prior contract output; any further inputs are
//! fee-funding coins. Outputs are the settlement outputs followed by exactly
//! one change output to the funder.

use crate::contract::{Continuation, ContractState, LockedOutput};
use crate::error::{GameError, Result};
use crate::settlement::SettlementPlan;

use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use serde::{Deserialize, Serialize};
use tictac_core::ledger::{estimate_signed_size, total_funding, total_output};
use tictac_core::{ContractCode, CoreError, FeePolicy, FundingUtxo};

pub const CONTRACT_INPUT: usize = 0;
pub const CONTINUATION_OUTPUT: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedMove {
    pub tx: Transaction,
    pub contract_input: usize,
    pub fee: Amount,
    pub continuation: Option<Continuation>,
}

impl UnsignedMove {
    pub fn change_output(&self) -> Option<&TxOut> {
        self.tx.output.last()
    }
}

pub struct TxBuilder<'a> {
    code: &'a ContractCode,
    fee_policy: &'a FeePolicy,
}

impl<'a> TxBuilder<'a> {
    pub fn new(code: &'a ContractCode, fee_policy: &'a FeePolicy) -> Self {
        Self { code, fee_policy }
    }

    pub fn build(
        &self,
        plan: &SettlementPlan,
        prior: &LockedOutput,
        next_state: &ContractState,
        funding: &[FundingUtxo],
        change_script: &ScriptBuf,
    ) -> Result<UnsignedMove> {
        plan.ensure_balanced(prior.amount)?;

        let mut input = vec![spend(prior.outpoint)];
        input.extend(funding.iter().map(|utxo| spend(utxo.outpoint)));

        let (mut output, continuation) = match plan {
            SettlementPlan::Continue { amount } => (
                vec![TxOut {
                    value: *amount,
                    script_pubkey: next_state.locking_script(self.code),
                }],
                Some(Continuation {
                    state: next_state.clone(),
                    output_index: CONTINUATION_OUTPUT,
                    amount: *amount,
                }),
            ),
            _ => (
                plan.payouts()
                    .into_iter()
                    .map(|payout| TxOut {
                        value: payout.amount,
                        script_pubkey: payout.script_pubkey.clone(),
                    })
                    .collect(),
                None,
            ),
        };
        let settlement_outputs = output.len();

        output.push(TxOut {
            value: Amount::ZERO,
            script_pubkey: change_script.clone(),
        });

        let mut tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input,
            output,
        };

        let fee = self
            .fee_policy
            .fee_for(estimate_signed_size(&tx, 1, self.fee_policy));
        let available = total_funding(funding)?;
        let change = available
            .checked_sub(fee)
            .ok_or(CoreError::InsufficientFunds {
                need: fee.to_sat(),
                available: available.to_sat(),
            })?;

        if let Some(change_out) = tx.output.last_mut() {
            change_out.value = change;
        }

        verify_conservation(&tx, settlement_outputs, prior.amount, available, fee)?;

        tracing::debug!(
            inputs = tx.input.len(),
            outputs = tx.output.len(),
            fee = fee.to_sat(),
            change = change.to_sat(),
            "Built move transaction"
        );

        Ok(UnsignedMove {
            tx,
            contract_input: CONTRACT_INPUT,
            fee,
            continuation,
        })
    }
}

fn spend(previous_output: bitcoin::OutPoint) -> TxIn {
    TxIn {
        previous_output,
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

/// Settlement outputs must carry exactly the locked amount, and every input
/// satoshi must land in an output or the fee. Totals that overflow count as
/// an imbalance.
fn verify_conservation(
    tx: &Transaction,
    settlement_outputs: usize,
    locked: Amount,
    funding: Amount,
    fee: Amount,
) -> Result<()> {
    let settled = tx.output[..settlement_outputs]
        .iter()
        .try_fold(Amount::ZERO, |acc, out| acc.checked_add(out.value));
    if settled != Some(locked) {
        return Err(GameError::SettlementImbalance {
            allocated: settled.unwrap_or(Amount::MAX),
            locked,
        });
    }

    let spent = total_output(tx)?.checked_add(fee);
    let received = locked.checked_add(funding);
    match (spent, received) {
        (Some(spent), Some(received)) if spent == received => Ok(()),
        (spent, received) => Err(GameError::SettlementImbalance {
            allocated: spent.unwrap_or(Amount::MAX),
            locked: received.unwrap_or(Amount::MAX),
        }),
    }
}
