//! Network parameters and Base58Check addresses
//!
//! The network is an explicit value passed to every call that renders or
//! parses an address; nothing here is global.

use crate::types::*;
use crate::error::{Result, PegError};
use crate::script::{extract_p2pkh_hash, extract_p2sh_hash, p2pkh_script, p2sh_script};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// Base58Check version byte of pay-to-pubkey-hash addresses
    pub fn pubkey_hash_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet | Network::Regtest => 0x6f,
        }
    }

    /// Base58Check version byte of pay-to-script-hash addresses
    pub fn script_hash_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet | Network::Regtest => 0xc4,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        };
        f.write_str(name)
    }
}

impl FromStr for Network {
    type Err = PegError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(PegError::InvalidAddress(format!("unknown network '{}'", other))),
        }
    }
}

/// Destination of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// Pay to the hash160 of a public key
    P2pkh(Hash160),
    /// Pay to the hash160 of a redeem script
    P2sh(Hash160),
}

impl Address {
    pub fn hash(&self) -> &Hash160 {
        match self {
            Address::P2pkh(hash) | Address::P2sh(hash) => hash,
        }
    }

    /// Locking script paying this address
    pub fn script_pubkey(&self) -> ByteString {
        match self {
            Address::P2pkh(hash) => p2pkh_script(hash),
            Address::P2sh(hash) => p2sh_script(hash),
        }
    }

    /// Recognize a standard P2PKH or P2SH locking script
    pub fn from_script_pubkey(script: &[u8]) -> Option<Self> {
        extract_p2pkh_hash(script)
            .map(Address::P2pkh)
            .or_else(|| extract_p2sh_hash(script).map(Address::P2sh))
    }

    /// Base58Check(version || hash)
    pub fn encode(&self, network: Network) -> String {
        let version = match self {
            Address::P2pkh(_) => network.pubkey_hash_version(),
            Address::P2sh(_) => network.script_hash_version(),
        };
        let mut data = Vec::with_capacity(21);
        data.push(version);
        data.extend_from_slice(self.hash());
        bs58::encode(data).with_check().into_string()
    }

    /// Parse a Base58Check address, rejecting addresses of another network
    pub fn decode(s: &str, network: Network) -> Result<Self> {
        let data = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| PegError::InvalidAddress(format!("{}: {}", s, e)))?;

        if data.len() != 21 {
            return Err(PegError::InvalidAddress(
                format!("{}: expected 21 bytes, got {}", s, data.len())
            ));
        }

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&data[1..]);

        match data[0] {
            v if v == network.pubkey_hash_version() => Ok(Address::P2pkh(hash)),
            v if v == network.script_hash_version() => Ok(Address::P2sh(hash)),
            v => Err(PegError::WrongNetwork(
                format!("{}: version byte {:#04x} is not valid on {}", s, v, network)
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_mainnet_p2pkh_zero_hash() {
        // hash160 of all zeroes encodes to the well-known burn address
        let address = Address::P2pkh([0u8; 20]);
        assert_eq!(address.encode(Network::Mainnet), "1111111111111111111114oLvT2");
    }

    #[test]
    fn test_address_prefixes() {
        let p2sh = Address::P2sh([0x42; 20]);
        assert!(p2sh.encode(Network::Mainnet).starts_with('3'));
        assert!(p2sh.encode(Network::Regtest).starts_with('2'));

        let p2pkh = Address::P2pkh([0x42; 20]);
        let regtest = p2pkh.encode(Network::Regtest);
        assert!(regtest.starts_with('m') || regtest.starts_with('n'));
    }

    #[test]
    fn test_decode_roundtrip() {
        for address in [Address::P2pkh([7; 20]), Address::P2sh([8; 20])] {
            let encoded = address.encode(Network::Regtest);
            assert_eq!(Address::decode(&encoded, Network::Regtest).unwrap(), address);
        }
    }

    #[test]
    fn test_decode_wrong_network() {
        let encoded = Address::P2sh([8; 20]).encode(Network::Mainnet);
        assert!(matches!(
            Address::decode(&encoded, Network::Regtest),
            Err(PegError::WrongNetwork(_))
        ));
    }

    #[test]
    fn test_decode_bad_checksum() {
        let mut encoded = Address::P2pkh([7; 20]).encode(Network::Mainnet);
        let last = encoded.pop().unwrap();
        encoded.push(if last == '2' { '3' } else { '2' });
        assert!(matches!(
            Address::decode(&encoded, Network::Mainnet),
            Err(PegError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_script_pubkey_recognition() {
        let address = Address::P2sh([3; 20]);
        assert_eq!(Address::from_script_pubkey(&address.script_pubkey()), Some(address));
        assert_eq!(Address::from_script_pubkey(&[0x51]), None);
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("regtest".parse::<Network>().unwrap(), Network::Regtest);
        assert_eq!("MAIN".parse::<Network>().unwrap(), Network::Mainnet);
        assert!("signet".parse::<Network>().is_err());
        assert_eq!(Network::Testnet.to_string(), "testnet");
    }
}
