//! Transactions under construction
//!
//! A [`TransactionDraft`] carries per-input signing state (previous
//! transaction, redeem script, partial signatures, final scriptSig) between
//! building, signing, finalizing and extraction. It is owned by the builder
//! that creates it and dropped after [`TransactionDraft::extract`].

use crate::types::*;
use crate::constants::*;
use crate::error::{Result, PegError};
use crate::finalizer::ScriptKind;
use crate::keys::Signer;
use crate::network::Address;
use crate::script::{extract_p2sh_hash, hash160, parse_script, Instruction};
use crate::transaction::{
    check_transaction, hash_to_hex, serialize_hex, serialize_transaction, signature_hash, txid,
};

/// A draft with every scriptSig assembled, ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedTransaction {
    tx: Transaction,
}

impl FinalizedTransaction {
    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn txid(&self) -> Hash {
        txid(&self.tx)
    }

    /// Byte-reversed txid, as `sendrawtransaction` reports it
    pub fn txid_hex(&self) -> String {
        hash_to_hex(&self.txid())
    }

    pub fn to_bytes(&self) -> ByteString {
        serialize_transaction(&self.tx)
    }

    pub fn to_hex(&self) -> String {
        serialize_hex(&self.tx)
    }

    /// Output `index` of this transaction as a spendable output
    pub fn output(&self, index: u32) -> Result<UnspentOutput> {
        UnspentOutput::from_transaction(&self.tx, index)
    }
}

/// A signature by one key over one input's sighash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSignature {
    /// Compressed public key of the signer
    pub pubkey: ByteString,
    /// DER signature followed by the sighash type byte
    pub signature: ByteString,
}

#[derive(Debug, Clone)]
pub struct DraftInput {
    pub prevout: OutPoint,
    pub sequence: u32,
    /// Full transaction holding the spent output (legacy signing input data)
    pub previous_tx: Transaction,
    /// Preimage of a P2SH locking script
    pub redeem_script: Option<ByteString>,
    pub partial_sigs: Vec<PartialSignature>,
    pub final_script_sig: Option<ByteString>,
}

impl DraftInput {
    /// The output this input spends
    pub fn spent_output(&self) -> &TransactionOutput {
        // Index validated by `TransactionDraft::add_input`
        &self.previous_tx.outputs[self.prevout.index as usize]
    }

    /// Script committed to by the signature hash: the redeem script for a
    /// P2SH spend, the locking script otherwise
    pub fn script_code(&self) -> &[u8] {
        match &self.redeem_script {
            Some(redeem) => redeem,
            None => &self.spent_output().script_pubkey,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.final_script_sig.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub version: i32,
    pub lock_time: u32,
    inputs: Vec<DraftInput>,
    outputs: Vec<TransactionOutput>,
}

impl Default for TransactionDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionDraft {
    pub fn new() -> Self {
        TransactionDraft {
            version: 2,
            lock_time: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn inputs(&self) -> &[DraftInput] {
        &self.inputs
    }

    /// Once any input carries a signature the sighash is fixed
    fn is_frozen(&self) -> bool {
        self.inputs.iter().any(|i| !i.partial_sigs.is_empty() || i.is_finalized())
    }

    fn input(&self, index: usize) -> Result<&DraftInput> {
        self.inputs.get(index).ok_or(PegError::InputOutOfRange {
            index,
            count: self.inputs.len(),
        })
    }

    /// Add an input spending `utxo`, optionally attaching a redeem script.
    ///
    /// The full source transaction must hash to the outpoint's txid and hold
    /// the referenced output with the claimed value and script.
    pub fn add_input(&mut self, utxo: &UnspentOutput, redeem_script: Option<ByteString>) -> Result<usize> {
        if self.is_frozen() {
            return Err(PegError::DraftFrozen);
        }
        if txid(&utxo.source_tx) != utxo.outpoint.hash {
            return Err(PegError::InvalidTransaction(
                "source transaction does not match the outpoint txid".to_string()
            ));
        }
        let output = utxo.source_tx.outputs.get(utxo.outpoint.index as usize).ok_or_else(|| {
            PegError::InvalidTransaction(format!(
                "source transaction has no output {}",
                utxo.outpoint.index
            ))
        })?;
        if output.value != utxo.value || output.script_pubkey != utxo.script_pubkey {
            return Err(PegError::InvalidTransaction(
                "unspent output does not match the source transaction".to_string()
            ));
        }

        self.inputs.push(DraftInput {
            prevout: utxo.outpoint,
            sequence: SEQUENCE_FINAL,
            previous_tx: utxo.source_tx.clone(),
            redeem_script,
            partial_sigs: Vec::new(),
            final_script_sig: None,
        });
        Ok(self.inputs.len() - 1)
    }

    pub fn add_output(&mut self, script_pubkey: ByteString, value: Integer) -> Result<usize> {
        if self.is_frozen() {
            return Err(PegError::DraftFrozen);
        }
        if !(0..=MAX_MONEY).contains(&value) {
            return Err(PegError::InvalidTransaction(format!("invalid output value {}", value)));
        }
        self.outputs.push(TransactionOutput { value, script_pubkey });
        Ok(self.outputs.len() - 1)
    }

    pub fn add_output_to(&mut self, address: &Address, value: Integer) -> Result<usize> {
        self.add_output(address.script_pubkey(), value)
    }

    pub fn total_input_value(&self) -> Integer {
        self.inputs.iter().map(|i| i.spent_output().value).sum()
    }

    pub fn total_output_value(&self) -> Integer {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Inputs minus outputs
    pub fn fee(&self) -> Integer {
        self.total_input_value() - self.total_output_value()
    }

    /// The transaction with empty scriptSigs
    pub fn unsigned_transaction(&self) -> Transaction {
        Transaction {
            version: self.version,
            inputs: self.inputs.iter().map(|i| TransactionInput {
                prevout: i.prevout,
                script_sig: Vec::new(),
                sequence: i.sequence,
            }).collect(),
            outputs: self.outputs.clone(),
            lock_time: self.lock_time,
        }
    }

    /// Legacy SIGHASH_ALL digest of input `index`
    pub fn sighash(&self, index: usize) -> Result<Hash> {
        let input = self.input(index)?;
        signature_hash(&self.unsigned_transaction(), index, input.script_code(), SIGHASH_ALL)
    }

    /// Sign input `index` with `signer` and record a partial signature.
    ///
    /// The signer's public key (or its hash160) must appear in the script
    /// code; a P2SH output cannot be signed without its redeem script.
    pub fn sign_input(&mut self, index: usize, signer: &Signer) -> Result<()> {
        let input = self.input(index)?;
        if input.is_finalized() {
            return Err(PegError::DraftFrozen);
        }
        if input.redeem_script.is_none() && extract_p2sh_hash(&input.spent_output().script_pubkey).is_some() {
            return Err(PegError::MissingRedeemScript(index));
        }

        let pubkey = signer.public_key_bytes().to_vec();
        if !script_references_key(input.script_code(), &pubkey) {
            return Err(PegError::SignatureMismatch);
        }

        let digest = self.sighash(index)?;
        let signature = signer.sign_digest(&digest, SIGHASH_ALL)?;

        let input = &mut self.inputs[index];
        input.partial_sigs.retain(|p| p.pubkey != pubkey);
        input.partial_sigs.push(PartialSignature { pubkey, signature });
        Ok(())
    }

    /// Assemble the final scriptSig of input `index` with the strategy of `kind`
    pub fn finalize_input(&mut self, index: usize, kind: &ScriptKind) -> Result<()> {
        let script_sig = kind.assemble_script_sig(index, self.input(index)?)?;
        let input = &mut self.inputs[index];
        input.final_script_sig = Some(script_sig);
        input.partial_sigs.clear();
        Ok(())
    }

    /// Produce the wire transaction, consuming the draft; every input must be finalized
    pub fn extract(self) -> Result<FinalizedTransaction> {
        let mut tx = self.unsigned_transaction();
        for (i, input) in self.inputs.iter().enumerate() {
            let script_sig = input.final_script_sig.as_ref().ok_or_else(|| {
                PegError::Finalization(format!("input {} is not finalized", i))
            })?;
            tx.inputs[i].script_sig = script_sig.clone();
        }

        let fee = self.fee();
        if fee < 0 {
            return Err(PegError::InsufficientFunds {
                needed: self.total_output_value(),
                available: self.total_input_value(),
            });
        }

        if let ValidationResult::Invalid(reason) = check_transaction(&tx)? {
            return Err(PegError::InvalidTransaction(reason));
        }
        Ok(FinalizedTransaction { tx })
    }
}

/// True if the script pushes `pubkey` or its hash160
fn script_references_key(script: &[u8], pubkey: &[u8]) -> bool {
    let key_hash = hash160(pubkey);
    match parse_script(script) {
        Ok(instructions) => instructions.iter().any(|i| match i {
            Instruction::Push(data) => data.as_slice() == pubkey || data.as_slice() == key_hash,
            Instruction::Op(_) => false,
        }),
        Err(_) => false,
    }
}
