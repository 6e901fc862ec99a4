//! Transaction wire format, identifiers, legacy signature hashing and sanity checks

use crate::types::*;
use crate::constants::*;
use crate::error::{Result, PegError};
use bitcoin_hashes::{sha256d, Hash as BitcoinHash};

/// CheckTransaction: 𝒯𝒳 → {valid, invalid}
///
/// A transaction tx = (v, ins, outs, lt) is valid if and only if:
/// 1. |ins| > 0 ∧ |outs| > 0
/// 2. ∀o ∈ outs: 0 ≤ o.value ≤ M_max and Σ o.value ≤ M_max
/// 3. |ins| ≤ M_max_inputs
/// 4. |outs| ≤ M_max_outputs
/// 5. |tx| ≤ M_max_tx_size
pub fn check_transaction(tx: &Transaction) -> Result<ValidationResult> {
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Ok(ValidationResult::Invalid("Empty inputs or outputs".to_string()));
    }

    let mut total: i64 = 0;
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value < 0 || output.value > MAX_MONEY {
            return Ok(ValidationResult::Invalid(
                format!("Invalid output value {} at index {}", output.value, i)
            ));
        }
        total += output.value;
        if total > MAX_MONEY {
            return Ok(ValidationResult::Invalid(
                format!("Total output value {} exceeds maximum", total)
            ));
        }
    }

    if tx.inputs.len() > MAX_INPUTS {
        return Ok(ValidationResult::Invalid(
            format!("Too many inputs: {}", tx.inputs.len())
        ));
    }

    if tx.outputs.len() > MAX_OUTPUTS {
        return Ok(ValidationResult::Invalid(
            format!("Too many outputs: {}", tx.outputs.len())
        ));
    }

    let tx_size = serialize_transaction(tx).len();
    if tx_size > MAX_TX_SIZE {
        return Ok(ValidationResult::Invalid(
            format!("Transaction too large: {} bytes", tx_size)
        ));
    }

    Ok(ValidationResult::Valid)
}

/// Sum of all output values
pub fn total_output_value(tx: &Transaction) -> Integer {
    tx.outputs.iter().map(|o| o.value).sum()
}

/// Check if transaction is coinbase
pub fn is_coinbase(tx: &Transaction) -> bool {
    tx.inputs.len() == 1 &&
    tx.inputs[0].prevout.hash == [0u8; 32] &&
    tx.inputs[0].prevout.index == 0xffffffff
}

/// Append a Bitcoin compact-size integer
pub fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Serialize(tx) in the legacy (non-witness) wire format
pub fn serialize_transaction(tx: &Transaction) -> ByteString {
    let mut buf = Vec::new();
    buf.extend_from_slice(&tx.version.to_le_bytes());

    write_compact_size(&mut buf, tx.inputs.len() as u64);
    for input in &tx.inputs {
        buf.extend_from_slice(&input.prevout.hash);
        buf.extend_from_slice(&input.prevout.index.to_le_bytes());
        write_compact_size(&mut buf, input.script_sig.len() as u64);
        buf.extend_from_slice(&input.script_sig);
        buf.extend_from_slice(&input.sequence.to_le_bytes());
    }

    write_compact_size(&mut buf, tx.outputs.len() as u64);
    for output in &tx.outputs {
        buf.extend_from_slice(&output.value.to_le_bytes());
        write_compact_size(&mut buf, output.script_pubkey.len() as u64);
        buf.extend_from_slice(&output.script_pubkey);
    }

    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf
}

/// Hex of the wire serialization, as accepted by `sendrawtransaction`
pub fn serialize_hex(tx: &Transaction) -> String {
    hex::encode(serialize_transaction(tx))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| PegError::Serialization(
                format!("unexpected end of data at offset {}", self.pos)
            ))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(bytes))
    }

    fn read_compact_size(&mut self) -> Result<u64> {
        match self.read_u8()? {
            0xfd => {
                let b = self.take(2)?;
                Ok(u16::from_le_bytes([b[0], b[1]]) as u64)
            }
            0xfe => Ok(self.read_u32()? as u64),
            0xff => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(self.take(8)?);
                Ok(u64::from_le_bytes(bytes))
            }
            n => Ok(n as u64),
        }
    }

    fn read_bytes(&mut self) -> Result<ByteString> {
        let len = self.read_compact_size()?;
        if len > MAX_TX_SIZE as u64 {
            return Err(PegError::Serialization(format!("length {} too large", len)));
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }
}

/// Deserialize a transaction from wire bytes.
///
/// Witness-serialized transactions are accepted (coinbases on a segwit chain
/// carry a witness) but the witness stacks are dropped: only the legacy view
/// is needed to spend their outputs, and the txid never commits to witnesses.
pub fn deserialize_transaction(bytes: &[u8]) -> Result<Transaction> {
    let mut reader = Reader::new(bytes);
    let version = reader.read_u32()? as i32;

    let mut has_witness = false;
    if reader.peek() == Some(0x00) {
        reader.read_u8()?;
        let flag = reader.read_u8()?;
        if flag != 0x01 {
            return Err(PegError::Serialization(format!("unknown segwit flag {}", flag)));
        }
        has_witness = true;
    }

    let input_count = reader.read_compact_size()?;
    let mut inputs = Vec::new();
    for _ in 0..input_count {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(reader.take(32)?);
        let index = reader.read_u32()?;
        let script_sig = reader.read_bytes()?;
        let sequence = reader.read_u32()?;
        inputs.push(TransactionInput {
            prevout: OutPoint { hash, index },
            script_sig,
            sequence,
        });
    }

    let output_count = reader.read_compact_size()?;
    let mut outputs = Vec::new();
    for _ in 0..output_count {
        let value = reader.read_i64()?;
        let script_pubkey = reader.read_bytes()?;
        outputs.push(TransactionOutput { value, script_pubkey });
    }

    if has_witness {
        for _ in 0..inputs.len() {
            let items = reader.read_compact_size()?;
            for _ in 0..items {
                reader.read_bytes()?;
            }
        }
    }

    let lock_time = reader.read_u32()?;
    if !reader.is_empty() {
        return Err(PegError::Serialization("trailing bytes after transaction".to_string()));
    }

    Ok(Transaction { version, inputs, outputs, lock_time })
}

/// Decode a raw transaction from hex
pub fn deserialize_hex(tx_hex: &str) -> Result<Transaction> {
    let bytes = hex::decode(tx_hex.trim())
        .map_err(|e| PegError::Serialization(format!("invalid hex: {}", e)))?;
    deserialize_transaction(&bytes)
}

/// SHA256(SHA256(x))
pub fn sha256d(data: &[u8]) -> Hash {
    sha256d::Hash::hash(data).into_inner()
}

/// TxId(tx) = SHA256(SHA256(Serialize(tx))), in internal byte order
pub fn txid(tx: &Transaction) -> Hash {
    sha256d(&serialize_transaction(tx))
}

/// Render an internal-order hash the way RPC interfaces display it (byte-reversed)
pub fn hash_to_hex(hash: &Hash) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// Parse a displayed (byte-reversed) txid into internal order
pub fn hash_from_hex(s: &str) -> Result<Hash> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| PegError::Serialization(format!("invalid txid hex: {}", e)))?;
    if bytes.len() != 32 {
        return Err(PegError::Serialization(format!("txid must be 32 bytes, got {}", bytes.len())));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    hash.reverse();
    Ok(hash)
}

/// Displayed txid of a transaction
pub fn txid_hex(tx: &Transaction) -> String {
    hash_to_hex(&txid(tx))
}

/// SignatureHash: 𝒯𝒳 × ℕ × 𝕊 × ℕ → ℍ (legacy algorithm)
///
/// 1. Copy tx and clear every input's scriptSig
/// 2. Put `script_code` into the scriptSig of input `input_index`
/// 3. Serialize and append the sighash type as 4 little-endian bytes
/// 4. Return SHA256(SHA256(·))
///
/// For a P2SH spend `script_code` is the redeem script, not the hash-based
/// locking script of the output.
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sighash_type: u32,
) -> Result<Hash> {
    if input_index >= tx.inputs.len() {
        return Err(PegError::InputOutOfRange { index: input_index, count: tx.inputs.len() });
    }
    if sighash_type & 0x1f != SIGHASH_ALL {
        return Err(PegError::InvalidTransaction(
            format!("unsupported sighash type {:#x}", sighash_type)
        ));
    }

    let mut copy = tx.clone();
    for (i, input) in copy.inputs.iter_mut().enumerate() {
        input.script_sig = if i == input_index { script_code.to_vec() } else { Vec::new() };
    }

    let mut preimage = serialize_transaction(&copy);
    preimage.extend_from_slice(&sighash_type.to_le_bytes());
    Ok(sha256d(&preimage))
}
