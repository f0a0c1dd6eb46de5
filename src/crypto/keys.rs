//! secp256k1 key management for ledger accounts
//!
//! Signatures are always produced over the SHA-256 digest of the bytes
//! handed in, so callers pass the canonical serialized form and never
//! pre-hash themselves.

use rand::rngs::OsRng;
use ripemd::{Digest, Ripemd160};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::fmt;
use thiserror::Error;

use super::hash::sha256;

/// Version byte prepended to every address payload
const ADDRESS_VERSION: u8 = 0x00;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature encoding")]
    InvalidSignature,
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A signing key together with its public half
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Rebuild a key pair from its secret half
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Compressed public key as hex
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Ledger address owned by this key
    pub fn address(&self) -> String {
        public_key_to_address(&self.public_key)
    }

    /// Sign arbitrary bytes (hashed with SHA-256 first)
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        sign_message(&self.secret_key, data)
    }

    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, KeyError> {
        verify_signature(&self.public_key, data, signature)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Derive the ledger address of a public key
///
/// Base58Check(version || RIPEMD160(SHA256(compressed pubkey))).
pub fn public_key_to_address(public_key: &PublicKey) -> String {
    let sha256_hash = sha256(&public_key.serialize());

    let mut ripemd = Ripemd160::new();
    ripemd.update(&sha256_hash);
    let ripemd_hash = ripemd.finalize();

    let mut address_bytes = vec![ADDRESS_VERSION];
    address_bytes.extend_from_slice(&ripemd_hash);

    let checksum = sha256(&sha256(&address_bytes));
    address_bytes.extend_from_slice(&checksum[..4]);

    bs58::encode(address_bytes).into_string()
}

/// Check the Base58Check envelope of an address
pub fn is_valid_address(address: &str) -> bool {
    let bytes = match bs58::decode(address).into_vec() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    if bytes.len() != 25 || bytes[0] != ADDRESS_VERSION {
        return false;
    }
    let (payload, checksum) = bytes.split_at(21);
    sha256(&sha256(payload))[..4] == *checksum
}

/// Parse a compressed or uncompressed public key from hex
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Sign the SHA-256 digest of `data`, returning a 64-byte compact signature
pub fn sign_message(secret_key: &SecretKey, data: &[u8]) -> Result<Vec<u8>, KeyError> {
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest_slice(&sha256(data))?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_compact().to_vec())
}

/// Verify a compact signature over the SHA-256 digest of `data`
///
/// A malformed signature is an error; a well-formed signature that does not
/// match is `Ok(false)`.
pub fn verify_signature(
    public_key: &PublicKey,
    data: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::verification_only();
    let message = Message::from_digest_slice(&sha256(data))?;
    let sig = Signature::from_compact(signature).map_err(|_| KeyError::InvalidSignature)?;

    Ok(secp.verify_ecdsa(&message, &sig, public_key).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_generation() {
        let kp = KeyPair::generate();
        assert_eq!(kp.private_key_hex().len(), 64);
        assert_eq!(kp.public_key_hex().len(), 66);
        assert!(is_valid_address(&kp.address()));
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let message = b"serialized trimmed transaction";

        let signature = kp.sign(message).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(kp.verify(message, &signature).unwrap());
        assert!(!kp.verify(b"something else", &signature).unwrap());
    }

    #[test]
    fn test_verify_with_other_key_fails() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let signature = kp.sign(b"payload").unwrap();
        assert!(!other.verify(b"payload", &signature).unwrap());
    }

    #[test]
    fn test_malformed_signature_is_error() {
        let kp = KeyPair::generate();
        assert!(matches!(
            kp.verify(b"payload", &[1, 2, 3]),
            Err(KeyError::InvalidSignature)
        ));
    }

    #[test]
    fn test_key_pair_from_hex() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::from_private_key_hex(&kp1.private_key_hex()).unwrap();
        assert_eq!(kp1.public_key_hex(), kp2.public_key_hex());
        assert_eq!(kp1.address(), kp2.address());
        assert_eq!(
            public_key_from_hex(&kp1.public_key_hex()).unwrap(),
            kp1.public_key
        );
    }

    #[test]
    fn test_address_format() {
        let kp = KeyPair::generate();
        let address = kp.address();
        assert!(address.starts_with('1'));

        let mut tampered = address.clone();
        tampered.pop();
        tampered.push(if address.ends_with('2') { '3' } else { '2' });
        assert!(!is_valid_address(&tampered));
    }
}
