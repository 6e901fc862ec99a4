//! Funding (peg-in) transaction builder
//!
//! Spends one P2PKH output into the script-hash address of a redemption
//! script. Both outputs pay that same address: the locked amount first, the
//! change second.

use crate::types::*;
use crate::error::{Result, PegError};
use crate::draft::{FinalizedTransaction, TransactionDraft};
use crate::finalizer::ScriptKind;
use crate::keys::Signer;
use crate::network::Address;
use crate::script::{extract_p2pkh_hash, verify_input};
use tracing::debug;

/// BuildFundingTx: 𝒰 × 𝒜 × ℤ × ℤ × 𝒦 → 𝒯𝒳
///
/// 1. funding + fee ≤ source.value, else InsufficientFunds
/// 2. hash160(signer.pubkey) = P2PKH target of source, else SignatureMismatch
/// 3. outputs = [(address, funding), (address, source.value − funding − fee)]
/// 4. Sign input 0 (legacy SIGHASH_ALL) and finalize as `<sig> <pubkey>`
///
/// Σ outputs + fee = source.value holds for every returned transaction.
pub fn build_funding_tx(
    source: &UnspentOutput,
    script_address: &Address,
    funding_amount: Integer,
    fee: Integer,
    signer: &Signer,
) -> Result<FinalizedTransaction> {
    if funding_amount < 0 || fee < 0 {
        return Err(PegError::InvalidTransaction(
            format!("negative amount: funding {}, fee {}", funding_amount, fee)
        ));
    }
    let needed = funding_amount.checked_add(fee).ok_or_else(|| {
        PegError::InvalidTransaction("funding amount overflows".to_string())
    })?;
    if needed > source.value {
        return Err(PegError::InsufficientFunds { needed, available: source.value });
    }

    match extract_p2pkh_hash(&source.script_pubkey) {
        Some(hash) if hash == signer.pubkey_hash() => {}
        _ => return Err(PegError::SignatureMismatch),
    }

    let change = source.value - needed;

    let mut draft = TransactionDraft::new();
    draft.add_input(source, None)?;
    draft.add_output_to(script_address, funding_amount)?;
    draft.add_output_to(script_address, change)?;

    draft.sign_input(0, signer)?;
    draft.finalize_input(0, &ScriptKind::PubkeyHash)?;
    let tx = draft.extract()?;

    if !verify_input(tx.transaction(), 0, &source.script_pubkey)? {
        return Err(PegError::Finalization("funding input does not verify".to_string()));
    }

    debug!(
        txid = %tx.txid_hex(),
        funding_amount,
        change,
        fee,
        "built funding transaction"
    );
    Ok(tx)
}
