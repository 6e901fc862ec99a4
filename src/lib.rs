//! # Peg-Settlement
//!
//! Two-phase Bitcoin peg-in / peg-out built on a data-carrying P2SH script.
//!
//! A payload is committed inside a redemption script that otherwise behaves
//! like pay-to-pubkey-hash. Coins are locked at the script's P2SH address by a
//! funding transaction and later released by a claim transaction whose
//! unlocking script is assembled by hand.
//!
//! ## Architecture
//!
//! - Script Builder (`script`): redemption script, hash160, script templates
//!   and the interpreter used to check every spend
//! - Funding Builder (`funding`): P2PKH input to the script address
//! - Claim Builder (`claim`, `finalizer`, `draft`): P2SH spend with manual
//!   finalization
//! - Chain Gateway (`gateway`, `rpc`): bitcoind RPC surface, plus an
//!   in-memory chain
//! - Driver (`flow`): mine, fund, confirm, claim
//!
//! ## Design Principles
//!
//! 1. **Pure Builders**: script and transaction builders are deterministic and side-effect-free
//! 2. **Explicit Network**: every address is rendered and parsed against a [`Network`] value
//! 3. **Exact Version Pinning**: all signing and hashing dependencies pinned to exact versions
//! 4. **No Partial Transactions**: builders return a fully verified transaction or an error
//!
//! ## Usage
//!
//! ```rust
//! use peg_settlement::PegEngine;
//! use peg_settlement::network::Network;
//!
//! let engine = PegEngine::new(Network::Regtest);
//! let script = engine.build_redemption_script(&[0u8; 20], &[7u8; 20]).unwrap();
//! assert!(engine.script_address(&script).starts_with('2'));
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod transaction;
pub mod script;
pub mod network;
pub mod keys;
pub mod draft;
pub mod finalizer;
pub mod funding;
pub mod claim;
pub mod gateway;
pub mod rpc;
pub mod config;
pub mod flow;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{ErrorCategory, PegError, Result};
pub use draft::FinalizedTransaction;
pub use keys::Signer;
pub use network::{Address, Network};
pub use script::RedemptionScript;

/// Entry point bound to one network
///
/// # Examples
///
/// ```
/// use peg_settlement::PegEngine;
/// use peg_settlement::network::Network;
///
/// let engine = PegEngine::new(Network::Testnet);
/// assert_eq!(engine.network(), Network::Testnet);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PegEngine {
    network: Network,
}

impl PegEngine {
    pub fn new(network: Network) -> Self {
        PegEngine { network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Build the data-carrying redemption script
    ///
    /// # Examples
    ///
    /// ```
    /// use peg_settlement::PegEngine;
    /// use peg_settlement::network::Network;
    ///
    /// let engine = PegEngine::new(Network::Regtest);
    /// let script = engine.build_redemption_script(&[0u8; 20], &[7u8; 20]).unwrap();
    ///
    /// // <20-byte push> OP_DROP OP_DUP OP_HASH160 <20-byte push> OP_EQUALVERIFY OP_CHECKSIG
    /// assert_eq!(script.as_bytes().len(), 21 + 1 + 1 + 1 + 21 + 1 + 1);
    ///
    /// // Key hashes must be exactly 20 bytes
    /// assert!(engine.build_redemption_script(&[0u8; 20], &[7u8; 19]).is_err());
    /// ```
    pub fn build_redemption_script(&self, payload: &[u8], recipient_key_hash: &[u8]) -> Result<RedemptionScript> {
        script::build_redemption_script(payload, recipient_key_hash)
    }

    /// P2SH address of a redemption script on this engine's network
    pub fn script_address(&self, redemption_script: &RedemptionScript) -> String {
        redemption_script.address_string(self.network)
    }

    /// Lock `funding_amount` at `script_address`, returning change to the same address
    ///
    /// # Examples
    ///
    /// ```
    /// use peg_settlement::{PegEngine, Signer};
    /// use peg_settlement::network::Network;
    /// use peg_settlement::script::p2pkh_script;
    /// use peg_settlement::types::*;
    ///
    /// let engine = PegEngine::new(Network::Regtest);
    /// let payer = Signer::from_secret_bytes(&[1u8; 32]).unwrap();
    /// let recipient = Signer::from_secret_bytes(&[2u8; 32]).unwrap();
    ///
    /// let coinbase = Transaction {
    ///     version: 1,
    ///     inputs: vec![TransactionInput {
    ///         prevout: OutPoint { hash: [0; 32], index: 0xffffffff },
    ///         script_sig: vec![0x01, 0x01],
    ///         sequence: 0xffffffff,
    ///     }],
    ///     outputs: vec![TransactionOutput {
    ///         value: 5_000_000_000, // 50 BTC
    ///         script_pubkey: p2pkh_script(&payer.pubkey_hash()),
    ///     }],
    ///     lock_time: 0,
    /// };
    /// let source = UnspentOutput::from_transaction(&coinbase, 0).unwrap();
    ///
    /// let script = engine.build_redemption_script(&[0u8; 20], &recipient.pubkey_hash()).unwrap();
    /// let address = engine.script_address(&script);
    /// let funding = engine.build_funding_tx(&source, &address, 100_000_000, 10_000, &payer).unwrap();
    ///
    /// assert_eq!(funding.transaction().outputs[1].value, 4_899_990_000);
    /// ```
    pub fn build_funding_tx(
        &self,
        source: &UnspentOutput,
        script_address: &str,
        funding_amount: Integer,
        fee: Integer,
        signer: &Signer,
    ) -> Result<FinalizedTransaction> {
        let address = Address::decode(script_address, self.network)?;
        funding::build_funding_tx(source, &address, funding_amount, fee, signer)
    }

    /// Spend the funded P2SH output to `destination`, paying `claim_amount − fee`
    pub fn build_claim_tx(
        &self,
        funded: &UnspentOutput,
        redemption_script: &RedemptionScript,
        destination: &str,
        claim_amount: Integer,
        fee: Integer,
        signer: &Signer,
    ) -> Result<FinalizedTransaction> {
        let destination = Address::decode(destination, self.network)?;
        claim::build_claim_tx(funded, redemption_script, &destination, claim_amount, fee, signer)
    }

    /// Run input `input_index` of `tx` against the output it spends
    pub fn verify_input(&self, tx: &Transaction, input_index: usize, prev_script_pubkey: &[u8]) -> Result<bool> {
        script::verify_input(tx, input_index, prev_script_pubkey)
    }
}
