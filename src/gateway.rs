//! Chain gateway: the RPC surface the peg flow consumes
//!
//! [`ChainGateway`] mirrors the four bitcoind calls the flow needs.
//! [`MemoryChain`] is a regtest-like in-memory chain that validates submitted
//! transactions with the script interpreter, so the whole flow can run
//! without a node.

use crate::types::*;
use crate::constants::*;
use crate::error::{Result, PegError};
use crate::network::{Address, Network};
use crate::script::{push_data, verify_input};
use crate::transaction::{
    check_transaction, deserialize_hex, hash_from_hex, hash_to_hex, is_coinbase, serialize_hex,
    sha256d, total_output_value, txid,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// `scriptPubKey` object of a verbose transaction output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptPubKeyInfo {
    pub hex: String,
}

/// One entry of `vout` in `getrawtransaction <txid> true`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoutInfo {
    /// Amount in BTC, as bitcoind reports it
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pubkey: ScriptPubKeyInfo,
}

impl VoutInfo {
    pub fn value_sats(&self) -> Integer {
        (self.value * SATOSHIS_PER_BTC as f64).round() as Integer
    }
}

/// Verbose `getrawtransaction` result (the fields the flow reads)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransactionInfo {
    pub txid: String,
    pub hex: String,
    pub vout: Vec<VoutInfo>,
}

impl RawTransactionInfo {
    /// Decode `hex` and check it hashes to `txid`
    pub fn transaction(&self) -> Result<Transaction> {
        let tx = deserialize_hex(&self.hex)?;
        if hash_to_hex(&txid(&tx)) != self.txid {
            return Err(PegError::Gateway(
                format!("transaction hex does not hash to {}", self.txid)
            ));
        }
        Ok(tx)
    }

    /// Output `index` as a spendable output carrying its full source transaction
    pub fn unspent_output(&self, index: u32) -> Result<UnspentOutput> {
        UnspentOutput::from_transaction(&self.transaction()?, index)
    }
}

/// Verbose `getblock` result (the fields the flow reads)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub hash: String,
    #[serde(default)]
    pub height: u64,
    pub tx: Vec<String>,
}

/// Index of the first output of `info` locked by exactly `script_pubkey`
pub fn find_output_for_script(info: &RawTransactionInfo, script_pubkey: &[u8]) -> Option<u32> {
    let wanted = hex::encode(script_pubkey);
    info.vout
        .iter()
        .find(|v| v.script_pubkey.hex.eq_ignore_ascii_case(&wanted))
        .map(|v| v.n)
}

pub trait ChainGateway {
    /// `sendrawtransaction`: returns the displayed txid
    fn submit_raw(&mut self, tx_hex: &str) -> Result<String>;

    /// `getrawtransaction <txid> true`
    fn fetch_tx(&mut self, txid: &str) -> Result<RawTransactionInfo>;

    /// `getblock <hash>`
    fn fetch_block(&mut self, hash: &str) -> Result<BlockInfo>;

    /// `generatetoaddress <count> <address>`: returns the new block hashes
    fn mine_to(&mut self, address: &str, count: u32) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
struct UtxoEntry {
    output: TransactionOutput,
    /// None while the creating transaction sits in the mempool
    height: Option<u64>,
    coinbase: bool,
}

#[derive(Debug, Clone)]
struct MemoryBlock {
    hash: Hash,
    height: u64,
    txids: Vec<Hash>,
}

/// In-memory chain with a mempool and coinbase maturity.
///
/// Every submitted input must exist, be unspent, be mature if it is a
/// coinbase output, and pass script verification (P2SH included).
#[derive(Debug)]
pub struct MemoryChain {
    network: Network,
    blocks: Vec<MemoryBlock>,
    transactions: HashMap<Hash, Transaction>,
    utxos: HashMap<OutPoint, UtxoEntry>,
    /// Pending txids with their fees
    mempool: Vec<(Hash, Integer)>,
}

impl MemoryChain {
    pub fn new(network: Network) -> Self {
        MemoryChain {
            network,
            blocks: Vec::new(),
            transactions: HashMap::new(),
            utxos: HashMap::new(),
            mempool: Vec::new(),
        }
    }

    pub fn tip_height(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.len()
    }

    /// True if `outpoint` is currently spendable (confirmed or in the mempool)
    pub fn is_unspent(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    /// Height of the block that confirmed `txid`, if any
    pub fn confirmation_height(&self, txid: &str) -> Option<u64> {
        let hash = hash_from_hex(txid).ok()?;
        self.blocks
            .iter()
            .find(|b| b.txids.contains(&hash))
            .map(|b| b.height)
    }

    fn validate(&self, tx: &Transaction) -> Result<Integer> {
        if let ValidationResult::Invalid(reason) = check_transaction(tx)? {
            return Err(PegError::Gateway(reason));
        }
        if is_coinbase(tx) {
            return Err(PegError::Gateway("coinbase transactions cannot be relayed".to_string()));
        }

        let next_height = self.tip_height() + 1;
        let mut total_in: Integer = 0;

        for (i, input) in tx.inputs.iter().enumerate() {
            if tx.inputs[..i].iter().any(|other| other.prevout == input.prevout) {
                return Err(PegError::Gateway("bad-txns-inputs-duplicate".to_string()));
            }
            let entry = self.utxos.get(&input.prevout).ok_or_else(|| {
                PegError::Gateway("bad-txns-inputs-missingorspent".to_string())
            })?;

            if entry.coinbase {
                let confirmed_at = entry.height.unwrap_or(next_height);
                if next_height - confirmed_at < COINBASE_MATURITY {
                    return Err(PegError::Gateway(format!(
                        "bad-txns-premature-spend-of-coinbase, depth {}",
                        next_height - confirmed_at
                    )));
                }
            }

            if !verify_input(tx, i, &entry.output.script_pubkey)? {
                return Err(PegError::Gateway(format!(
                    "mandatory-script-verify-flag-failed (input {})", i
                )));
            }
            total_in += entry.output.value;
        }

        let total_out = total_output_value(tx);
        if total_out > total_in {
            return Err(PegError::Gateway("bad-txns-in-belowout".to_string()));
        }
        Ok(total_in - total_out)
    }

    fn coinbase(&self, height: u64, script_pubkey: &[u8], fees: Integer) -> Transaction {
        // BIP34 height push keeps coinbase txids unique
        let mut script_sig = Vec::new();
        push_data(&mut script_sig, &height.to_le_bytes()[..4]);
        Transaction {
            version: 2,
            inputs: vec![TransactionInput {
                prevout: OutPoint { hash: [0; 32], index: 0xffffffff },
                script_sig,
                sequence: SEQUENCE_FINAL,
            }],
            outputs: vec![TransactionOutput {
                value: INITIAL_SUBSIDY + fees,
                script_pubkey: script_pubkey.to_vec(),
            }],
            lock_time: 0,
        }
    }

    fn mine_block(&mut self, script_pubkey: &[u8]) -> Hash {
        let height = self.tip_height() + 1;

        let fees: Integer = self.mempool.iter().map(|(_, fee)| fee).sum();

        let coinbase = self.coinbase(height, script_pubkey, fees);
        let coinbase_id = txid(&coinbase);
        for (index, output) in coinbase.outputs.iter().enumerate() {
            self.utxos.insert(
                OutPoint { hash: coinbase_id, index: index as u32 },
                UtxoEntry { output: output.clone(), height: Some(height), coinbase: true },
            );
        }
        self.transactions.insert(coinbase_id, coinbase);

        let mut txids = vec![coinbase_id];
        for (id, _) in self.mempool.drain(..) {
            for entry in self.utxos.iter_mut()
                .filter(|(outpoint, _)| outpoint.hash == id)
                .map(|(_, entry)| entry)
            {
                entry.height = Some(height);
            }
            txids.push(id);
        }

        let mut preimage = self.blocks.last().map(|b| b.hash.to_vec()).unwrap_or_default();
        for id in &txids {
            preimage.extend_from_slice(id);
        }
        let hash = sha256d(&preimage);

        self.blocks.push(MemoryBlock { hash, height, txids });
        hash
    }
}

impl ChainGateway for MemoryChain {
    fn submit_raw(&mut self, tx_hex: &str) -> Result<String> {
        let tx = deserialize_hex(tx_hex).map_err(|e| PegError::Gateway(format!("TX decode failed: {}", e)))?;
        let id = txid(&tx);
        if self.transactions.contains_key(&id) {
            return Err(PegError::Gateway("txn-already-known".to_string()));
        }

        let fee = match self.validate(&tx) {
            Ok(fee) => fee,
            Err(e) => {
                warn!(txid = %hash_to_hex(&id), error = %e, "rejected transaction");
                return Err(e);
            }
        };

        for input in &tx.inputs {
            self.utxos.remove(&input.prevout);
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            self.utxos.insert(
                OutPoint { hash: id, index: index as u32 },
                UtxoEntry { output: output.clone(), height: None, coinbase: false },
            );
        }
        self.transactions.insert(id, tx);
        self.mempool.push((id, fee));

        debug!(txid = %hash_to_hex(&id), fee, "accepted transaction into mempool");
        Ok(hash_to_hex(&id))
    }

    fn fetch_tx(&mut self, txid: &str) -> Result<RawTransactionInfo> {
        let hash = hash_from_hex(txid)?;
        let tx = self.transactions.get(&hash).ok_or_else(|| {
            PegError::Gateway(format!("No such mempool or blockchain transaction: {}", txid))
        })?;

        let vout = tx.outputs.iter().enumerate().map(|(n, output)| VoutInfo {
            value: output.value as f64 / SATOSHIS_PER_BTC as f64,
            n: n as u32,
            script_pubkey: ScriptPubKeyInfo { hex: hex::encode(&output.script_pubkey) },
        }).collect();

        Ok(RawTransactionInfo {
            txid: hash_to_hex(&hash),
            hex: serialize_hex(tx),
            vout,
        })
    }

    fn fetch_block(&mut self, hash: &str) -> Result<BlockInfo> {
        let wanted = hash_from_hex(hash)?;
        let block = self.blocks.iter().find(|b| b.hash == wanted).ok_or_else(|| {
            PegError::Gateway(format!("Block not found: {}", hash))
        })?;
        Ok(BlockInfo {
            hash: hash_to_hex(&block.hash),
            height: block.height,
            tx: block.txids.iter().map(hash_to_hex).collect(),
        })
    }

    fn mine_to(&mut self, address: &str, count: u32) -> Result<Vec<String>> {
        let address = Address::decode(address, self.network)
            .map_err(|e| PegError::Gateway(format!("Invalid address: {}", e)))?;
        let script_pubkey = address.script_pubkey();

        let mut hashes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            hashes.push(hash_to_hex(&self.mine_block(&script_pubkey)));
        }
        info!(count, tip = self.tip_height(), "mined blocks");
        Ok(hashes)
    }
}
