//! Server EVM wallet and token unit helpers
//!
//! The server wallet pays Irys storage and submits attestations. Its address is
//! published through `/api/publicKey`.

use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, U256};
use ethers::utils::{format_units, parse_units, to_checksum};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("invalid amount '{amount}': {reason}")]
    InvalidAmount { amount: String, reason: String },
}

/// EVM key pair held by the node
#[derive(Clone)]
pub struct ServerWallet {
    inner: LocalWallet,
}

impl ServerWallet {
    pub fn from_private_key(key: &str) -> Result<Self, WalletError> {
        let inner = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    /// EIP-55 checksummed address
    pub fn checksum_address(&self) -> String {
        to_checksum(&self.inner.address(), None)
    }

    /// Address as Irys reports it for EVM tokens (lowercase hex)
    pub fn irys_address(&self) -> String {
        format!("{:?}", self.inner.address())
    }

    /// 65-byte uncompressed secp256k1 public key, the ANS-104 owner field
    pub fn public_key(&self) -> Vec<u8> {
        self.inner
            .signer()
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// EIP-191 personal-sign over raw bytes
    pub async fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError> {
        self.inner
            .sign_message(message)
            .await
            .map_err(|e| WalletError::Signing(e.to_string()))
    }

    /// Underlying signer, bound to a chain id when sending transactions
    pub fn signer(&self) -> &LocalWallet {
        &self.inner
    }
}

impl std::fmt::Debug for ServerWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerWallet")
            .field("address", &self.checksum_address())
            .finish()
    }
}

/// Recover the signer of an EIP-191 personal-sign signature
pub fn recover_personal_signer(message: &str, signature: &str) -> Result<Address, WalletError> {
    let signature = Signature::from_str(signature.trim())
        .map_err(|e| WalletError::InvalidSignature(e.to_string()))?;
    signature
        .recover(message.as_bytes())
        .map_err(|e| WalletError::InvalidSignature(e.to_string()))
}

/// Convert a standard-unit decimal string ("0.005") to atomic units
pub fn to_atomic(amount: &str, decimals: u32) -> Result<U256, WalletError> {
    let trimmed = amount.trim();
    if trimmed.starts_with('-') {
        return Err(WalletError::InvalidAmount {
            amount: amount.to_string(),
            reason: "amount must not be negative".to_string(),
        });
    }
    let parsed = parse_units(trimmed, decimals).map_err(|e| WalletError::InvalidAmount {
        amount: amount.to_string(),
        reason: e.to_string(),
    })?;
    Ok(parsed.into())
}

/// Convert atomic units to a standard-unit decimal string without trailing zeros
pub fn from_atomic(amount: U256, decimals: u32) -> Result<String, WalletError> {
    let formatted = format_units(amount, decimals).map_err(|e| WalletError::InvalidAmount {
        amount: amount.to_string(),
        reason: e.to_string(),
    })?;
    Ok(trim_decimal(&formatted))
}

fn trim_decimal(value: &str) -> String {
    if !value.contains('.') {
        return value.to_string();
    }
    let trimmed = value.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test vector key
    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const ADDRESS: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";

    #[test]
    fn test_address_derivation() {
        let wallet = ServerWallet::from_private_key(KEY).unwrap();
        assert_eq!(wallet.checksum_address(), ADDRESS);
        assert_eq!(wallet.irys_address(), ADDRESS.to_lowercase());
        assert_eq!(wallet.public_key().len(), 65);
        assert_eq!(wallet.public_key()[0], 0x04);
    }

    #[test]
    fn test_key_without_prefix() {
        let wallet = ServerWallet::from_private_key(&KEY[2..]).unwrap();
        assert_eq!(wallet.checksum_address(), ADDRESS);
    }

    #[test]
    fn test_invalid_key() {
        assert!(ServerWallet::from_private_key("0x1234").is_err());
    }

    #[tokio::test]
    async fn test_sign_and_recover() {
        let wallet = ServerWallet::from_private_key(KEY).unwrap();
        let message = r#"{"userEOA":"0x2c7536E3605D9C16a7a3D7b1898e529396a65c23","thumbnailHash":"ab"}"#;
        let signature = wallet.sign_message(message.as_bytes()).await.unwrap();
        let recovered =
            recover_personal_signer(message, &format!("0x{}", signature)).unwrap();
        assert_eq!(recovered, wallet.address());

        let other = recover_personal_signer("tampered", &format!("0x{}", signature)).unwrap();
        assert_ne!(other, wallet.address());
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(to_atomic("0.005", 18).unwrap(), U256::from(5_000_000_000_000_000u64));
        assert_eq!(to_atomic("1", 6).unwrap(), U256::from(1_000_000u64));
        assert!(to_atomic("abc", 18).is_err());
        assert!(to_atomic("-1", 18).is_err());

        assert_eq!(from_atomic(U256::from(5_000_000_000_000_000u64), 18).unwrap(), "0.005");
        assert_eq!(from_atomic(U256::zero(), 18).unwrap(), "0");
        assert_eq!(from_atomic(U256::exp10(18) * U256::from(2u64), 18).unwrap(), "2");
    }
}
