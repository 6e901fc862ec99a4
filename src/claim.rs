//! Claim (peg-out) transaction builder
//!
//! Spends the funded script-hash output. The redemption script is not a
//! standard template, so the unlocking script is assembled by hand from the
//! partial signature: `<sig> <pubkey> <redemption script>`.

use crate::types::*;
use crate::error::{Result, PegError};
use crate::draft::{FinalizedTransaction, TransactionDraft};
use crate::finalizer::ScriptKind;
use crate::keys::Signer;
use crate::network::Address;
use crate::script::{extract_p2sh_hash, verify_input, RedemptionScript};
use tracing::debug;

/// Fail with `ScriptMismatch` unless `funded` is locked to the hash of `redemption_script`
pub fn check_redemption_script(funded: &UnspentOutput, redemption_script: &RedemptionScript) -> Result<()> {
    match extract_p2sh_hash(&funded.script_pubkey) {
        Some(hash) if hash == redemption_script.script_hash() => Ok(()),
        _ => Err(PegError::ScriptMismatch),
    }
}

/// Unsigned claim draft: one input carrying the redeem script, one output
/// paying `claim_amount − fee` to `destination`
pub fn build_claim_draft(
    funded: &UnspentOutput,
    redemption_script: &RedemptionScript,
    destination: &Address,
    claim_amount: Integer,
    fee: Integer,
) -> Result<TransactionDraft> {
    if claim_amount < 0 || fee < 0 {
        return Err(PegError::InvalidTransaction(
            format!("negative amount: claim {}, fee {}", claim_amount, fee)
        ));
    }
    if claim_amount > funded.value {
        return Err(PegError::InsufficientFunds { needed: claim_amount, available: funded.value });
    }
    if fee > claim_amount {
        return Err(PegError::InsufficientFunds { needed: fee, available: claim_amount });
    }

    let mut draft = TransactionDraft::new();
    draft.add_input(funded, Some(redemption_script.as_bytes().to_vec()))?;
    draft.add_output_to(destination, claim_amount - fee)?;
    Ok(draft)
}

/// Manually finalize input 0 of a signed claim draft and extract it, consuming the draft.
///
/// The redeem-script hash is checked against the funded output before any
/// script is assembled or serialized.
pub fn finalize_claim(mut draft: TransactionDraft, redemption_script: &RedemptionScript) -> Result<FinalizedTransaction> {
    draft.finalize_input(0, &ScriptKind::HashLocked(redemption_script.clone()))?;
    draft.extract()
}

/// BuildClaimTx: 𝒰 × 𝒮𝒞 × 𝒜 × ℤ × ℤ × 𝒦 → 𝒯𝒳
///
/// 1. hash160(redemption_script) = P2SH target of funded, else ScriptMismatch
/// 2. hash160(signer.pubkey) = recipient key hash, else SignatureMismatch
/// 3. Build the draft, sign with the redemption script as script code
/// 4. Finalize as `<sig> <pubkey> <redemption_script>`, no witness
pub fn build_claim_tx(
    funded: &UnspentOutput,
    redemption_script: &RedemptionScript,
    destination: &Address,
    claim_amount: Integer,
    fee: Integer,
    signer: &Signer,
) -> Result<FinalizedTransaction> {
    check_redemption_script(funded, redemption_script)?;
    if signer.pubkey_hash() != *redemption_script.recipient_key_hash() {
        return Err(PegError::SignatureMismatch);
    }

    let mut draft = build_claim_draft(funded, redemption_script, destination, claim_amount, fee)?;
    draft.sign_input(0, signer)?;
    let tx = finalize_claim(draft, redemption_script)?;

    if !verify_input(tx.transaction(), 0, &funded.script_pubkey)? {
        return Err(PegError::Finalization("claim input does not verify".to_string()));
    }

    debug!(
        txid = %tx.txid_hex(),
        claim_amount,
        fee,
        "built claim transaction"
    );
    Ok(tx)
}
