//! Peg-in / peg-out driver
//!
//! Runs the two phases against a [`ChainGateway`] in strict order: mine a
//! spendable coinbase for the sender, lock part of it under the redemption
//! script, wait for confirmation, then claim it to a fresh address. The
//! first error aborts the run.

use crate::types::*;
use crate::error::{Result, PegError};
use crate::claim::build_claim_tx;
use crate::config::FlowConfig;
use crate::funding::build_funding_tx;
use crate::gateway::{find_output_for_script, ChainGateway};
use crate::keys::Signer;
use crate::network::Network;
use crate::script::build_redemption_script;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Key pairs taking part in one run
#[derive(Debug, Clone)]
pub struct Participants {
    /// Owns the mined coinbase and pays the funding transaction
    pub sender: Signer,
    /// Key hash committed in the redemption script; signs the claim
    pub recipient: Signer,
    /// Receives the claimed coins
    pub destination: Signer,
}

impl Participants {
    pub fn generate() -> Self {
        Participants {
            sender: Signer::generate(),
            recipient: Signer::generate(),
            destination: Signer::generate(),
        }
    }
}

/// Artifacts produced by a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PegReport {
    pub network: Network,
    pub script_address: String,
    pub redemption_script_hex: String,
    pub funding_txid: String,
    pub funding_hex: String,
    pub claim_txid: String,
    pub claim_hex: String,
    /// Satoshis paid to the destination
    pub claimed_value: Integer,
    pub destination_address: String,
}

pub struct PegFlow {
    network: Network,
    config: FlowConfig,
}

impl PegFlow {
    pub fn new(network: Network, config: FlowConfig) -> Self {
        PegFlow { network, config }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn run<G: ChainGateway>(&self, gateway: &mut G, participants: &Participants) -> Result<PegReport> {
        let sender_address = participants.sender.p2pkh_address_string(self.network);
        let source = self.mine_spendable_coinbase(gateway, &participants.sender, &sender_address)?;

        let redemption_script = build_redemption_script(
            &self.config.payload()?,
            &participants.recipient.pubkey_hash(),
        )?;
        let script_address = redemption_script.address_string(self.network);
        info!(%script_address, "redemption script address");
        debug!(script = %hex::encode(redemption_script.as_bytes()), "redemption script");

        // Peg-in
        let funding = build_funding_tx(
            &source,
            &redemption_script.address(),
            self.config.funding_amount,
            self.config.funding_fee,
            &participants.sender,
        )?;
        debug!(hex = %funding.to_hex(), "funding transaction");
        let funding_txid = self.submit(gateway, &funding.to_hex(), &funding.txid_hex())?;
        info!(txid = %funding_txid, amount = self.config.funding_amount, "funding transaction submitted");

        gateway.mine_to(&sender_address, self.config.confirm_blocks)?;

        // Peg-out
        let funded = gateway.fetch_tx(&funding_txid)?.unspent_output(0)?;
        let destination = participants.destination.p2pkh_address();
        let claim = build_claim_tx(
            &funded,
            &redemption_script,
            &destination,
            self.config.funding_amount,
            self.config.claim_fee,
            &participants.recipient,
        )?;
        debug!(hex = %claim.to_hex(), "claim transaction");
        let claim_txid = self.submit(gateway, &claim.to_hex(), &claim.txid_hex())?;
        info!(txid = %claim_txid, "claim transaction submitted");

        gateway.mine_to(&sender_address, self.config.confirm_blocks)?;

        let claimed = gateway.fetch_tx(&claim_txid)?;
        let claimed_value = claimed.vout.first().map(|v| v.value_sats()).ok_or_else(|| {
            PegError::Gateway(format!("claim transaction {} has no outputs", claim_txid))
        })?;

        Ok(PegReport {
            network: self.network,
            script_address,
            redemption_script_hex: hex::encode(redemption_script.as_bytes()),
            funding_txid,
            funding_hex: funding.to_hex(),
            claim_txid,
            claim_hex: claimed.hex,
            claimed_value,
            destination_address: destination.encode(self.network),
        })
    }

    /// Mine maturity blocks to the sender and return the first block's
    /// coinbase output paying it
    fn mine_spendable_coinbase<G: ChainGateway>(
        &self,
        gateway: &mut G,
        sender: &Signer,
        sender_address: &str,
    ) -> Result<UnspentOutput> {
        let blocks = gateway.mine_to(sender_address, self.config.maturity_blocks)?;
        let first = blocks.first().ok_or_else(|| {
            PegError::Gateway("no blocks were mined".to_string())
        })?;

        let block = gateway.fetch_block(first)?;
        let coinbase_txid = block.tx.first().ok_or_else(|| {
            PegError::Gateway(format!("block {} has no transactions", block.hash))
        })?;

        let coinbase = gateway.fetch_tx(coinbase_txid)?;
        let vout = find_output_for_script(&coinbase, &sender.p2pkh_address().script_pubkey())
            .ok_or_else(|| {
                PegError::Gateway(format!("coinbase {} does not pay {}", coinbase.txid, sender_address))
            })?;

        let source = coinbase.unspent_output(vout)?;
        info!(txid = %coinbase.txid, vout, value = source.value, "spending coinbase output");
        Ok(source)
    }

    fn submit<G: ChainGateway>(&self, gateway: &mut G, tx_hex: &str, expected_txid: &str) -> Result<String> {
        let txid = gateway.submit_raw(tx_hex)?;
        if txid != expected_txid {
            warn!(%txid, %expected_txid, "node reported a different txid");
        }
        Ok(txid)
    }
}
