//! Signing keys

use crate::types::*;
use crate::error::{Result, PegError};
use crate::network::{Address, Network};
use crate::script::hash160;
use rand::RngCore;
use secp256k1::{Secp256k1, SecretKey, PublicKey, Message, All};

/// A secp256k1 key pair producing legacy (DER + sighash byte) signatures
#[derive(Clone)]
pub struct Signer {
    secp: Secp256k1<All>,
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl Signer {
    /// Fresh random key pair
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            // Retry on an out-of-range scalar
            if let Ok(signer) = Signer::from_secret_bytes(&bytes) {
                return signer;
            }
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| PegError::InvalidKey(e.to_string()))?;
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Ok(Signer { secp, secret_key, public_key })
    }

    /// Compressed SEC1 public key (33 bytes)
    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.public_key.serialize()
    }

    /// Hash160 of the compressed public key
    pub fn pubkey_hash(&self) -> Hash160 {
        hash160(&self.public_key_bytes())
    }

    pub fn p2pkh_address(&self) -> Address {
        Address::P2pkh(self.pubkey_hash())
    }

    pub fn p2pkh_address_string(&self, network: Network) -> String {
        self.p2pkh_address().encode(network)
    }

    /// RFC6979 ECDSA over `digest`, DER-encoded with the sighash type appended
    pub fn sign_digest(&self, digest: &Hash, sighash_type: u32) -> Result<ByteString> {
        let message = Message::from_digest_slice(digest)
            .map_err(|e| PegError::InvalidKey(e.to_string()))?;
        let signature = self.secp.sign_ecdsa(&message, &self.secret_key);
        let mut bytes = signature.serialize_der().to_vec();
        bytes.push(sighash_type as u8);
        Ok(bytes)
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_secret_bytes_rejects_zero() {
        assert!(matches!(Signer::from_secret_bytes(&[0u8; 32]), Err(PegError::InvalidKey(_))));
    }

    #[test]
    fn test_public_key_is_compressed() {
        let signer = Signer::from_secret_bytes(&[0x11; 32]).unwrap();
        let pubkey = signer.public_key_bytes();
        assert!(pubkey[0] == 0x02 || pubkey[0] == 0x03);
        assert_eq!(signer.pubkey_hash(), hash160(&pubkey));
    }

    #[test]
    fn test_signatures_are_deterministic() {
        let signer = Signer::from_secret_bytes(&[0x22; 32]).unwrap();
        let a = signer.sign_digest(&[5; 32], 1).unwrap();
        let b = signer.sign_digest(&[5; 32], 1).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0], 0x30);
        assert_eq!(*a.last().unwrap(), 0x01);
    }

    #[test]
    fn test_generate_distinct_keys() {
        assert_ne!(Signer::generate().public_key_bytes(), Signer::generate().public_key_bytes());
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = Signer::from_secret_bytes(&[0x33; 32]).unwrap();
        let shown = format!("{:?}", signer);
        assert!(!shown.contains(&hex::encode([0x33u8; 32])));
    }
}
