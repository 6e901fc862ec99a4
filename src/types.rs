//! Core transaction types shared by the builders and the chain gateway

use serde::{Deserialize, Serialize};

/// Hash type: 256-bit hash, stored in wire (internal) byte order
pub type Hash = [u8; 32];

/// 160-bit hash: RIPEMD160(SHA256(x))
pub type Hash160 = [u8; 20];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Integer type, used for satoshi amounts as on the wire
pub type Integer = i64;

/// Reference to one output of a prior transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: Integer,
    pub script_pubkey: ByteString,
}

/// Legacy (non-witness) transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

/// A spendable output together with the transaction that created it.
///
/// Legacy signing hashes the whole previous transaction, so the source
/// transaction travels with the output it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub value: Integer,
    pub script_pubkey: ByteString,
    pub source_tx: Transaction,
}

impl UnspentOutput {
    /// Build the view of output `index` of `tx`.
    pub fn from_transaction(tx: &Transaction, index: u32) -> crate::Result<Self> {
        let output = tx.outputs.get(index as usize).ok_or_else(|| {
            crate::PegError::InvalidTransaction(format!(
                "output {} out of range ({} outputs)",
                index,
                tx.outputs.len()
            ))
        })?;
        Ok(UnspentOutput {
            outpoint: OutPoint {
                hash: crate::transaction::txid(tx),
                index,
            },
            value: output.value,
            script_pubkey: output.script_pubkey.clone(),
            source_tx: tx.clone(),
        })
    }
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}
