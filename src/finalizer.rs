//! Unlocking-script assembly for the closed set of spendable script kinds

use crate::types::*;
use crate::error::{Result, PegError};
use crate::draft::{DraftInput, PartialSignature};
use crate::script::{extract_p2pkh_hash, extract_p2sh_hash, hash160, push_data, RedemptionScript};
use secp256k1::ecdsa::Signature;

/// Which locking-script template an input spends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind {
    /// Standard P2PKH: scriptSig `<sig> <pubkey>`
    PubkeyHash,
    /// P2SH output locked by a data-carrying redemption script:
    /// scriptSig `<sig> <pubkey> <redeem script>`
    HashLocked(RedemptionScript),
}

impl ScriptKind {
    /// Build the final scriptSig for `input` from its partial signature
    pub fn assemble_script_sig(&self, index: usize, input: &DraftInput) -> Result<ByteString> {
        let spent_script = &input.spent_output().script_pubkey;

        match self {
            ScriptKind::PubkeyHash => {
                let key_hash = extract_p2pkh_hash(spent_script).ok_or_else(|| {
                    PegError::Finalization(format!("input {} does not spend a P2PKH output", index))
                })?;
                let partial = first_partial_sig(index, input)?;
                check_partial_sig(partial, &key_hash)?;

                let mut script_sig = Vec::new();
                push_data(&mut script_sig, &partial.signature);
                push_data(&mut script_sig, &partial.pubkey);
                Ok(script_sig)
            }
            ScriptKind::HashLocked(redeem_script) => {
                // Redeem hash before signatures
                match extract_p2sh_hash(spent_script) {
                    Some(hash) if hash == redeem_script.script_hash() => {}
                    _ => return Err(PegError::ScriptMismatch),
                }
                if let Some(attached) = &input.redeem_script {
                    if attached.as_slice() != redeem_script.as_bytes() {
                        return Err(PegError::ScriptMismatch);
                    }
                }

                let partial = first_partial_sig(index, input)?;
                check_partial_sig(partial, redeem_script.recipient_key_hash())?;

                // <sig> <recipientPublicKey>
                let mut unlocking = Vec::new();
                push_data(&mut unlocking, &partial.signature);
                push_data(&mut unlocking, &partial.pubkey);

                let mut script_sig = unlocking;
                push_data(&mut script_sig, redeem_script.as_bytes());
                Ok(script_sig)
            }
        }
    }
}

fn first_partial_sig(index: usize, input: &DraftInput) -> Result<&PartialSignature> {
    input.partial_sigs.first().ok_or(PegError::MissingPartialSignature(index))
}

fn check_partial_sig(partial: &PartialSignature, expected_key_hash: &Hash160) -> Result<()> {
    if hash160(&partial.pubkey) != *expected_key_hash {
        return Err(PegError::Finalization(
            "partial signature key does not match the spend condition".to_string()
        ));
    }
    let der = match partial.signature.split_last() {
        Some((_, der)) if !der.is_empty() => der,
        _ => return Err(PegError::Finalization("empty partial signature".to_string())),
    };
    Signature::from_der(der)
        .map_err(|e| PegError::Finalization(format!("malformed partial signature: {}", e)))?;
    Ok(())
}
