//! Invoicing details attached to a wallet (`billing_profiles`).

use crate::domain::{TimeMs, WalletAddress};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "Pending",
            VerificationStatus::Verified => "Verified",
            VerificationStatus::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(VerificationStatus::Pending),
            "verified" => Ok(VerificationStatus::Verified),
            "rejected" => Ok(VerificationStatus::Rejected),
            other => Err(format!("unknown verification status: {}", other)),
        }
    }
}

/// Editable profile fields, shared by the owner's upsert and admin edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillingDetails {
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingProfile {
    pub id: i64,
    pub wallet_address: WalletAddress,
    pub full_name: String,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub is_default: bool,
    /// SHA-256 hex of [`BillingProfile::verification_message`] once the
    /// owner signed it.
    pub verification_hash: Option<String>,
    pub verification_status: VerificationStatus,
    pub verification_timestamp: Option<TimeMs>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl BillingProfile {
    /// The text the owner signs with their wallet to verify the profile.
    pub fn verification_message(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.wallet_address,
            self.full_name,
            self.email.as_deref().unwrap_or(""),
            self.tax_id.as_deref().unwrap_or("")
        )
    }

    pub fn verification_hash_hex(&self) -> String {
        hex::encode(Sha256::digest(self.verification_message().as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> BillingProfile {
        BillingProfile {
            id: 1,
            wallet_address: WalletAddress::from_str("0x1111111111111111111111111111111111111111")
                .unwrap(),
            full_name: "Ada Lovelace".to_string(),
            company_name: None,
            tax_id: None,
            address: None,
            city: None,
            postal_code: None,
            country: None,
            phone_number: None,
            email: Some("ada@example.com".to_string()),
            notes: None,
            is_default: false,
            verification_hash: None,
            verification_status: VerificationStatus::Pending,
            verification_timestamp: None,
            created_at: TimeMs::new(0),
            updated_at: TimeMs::new(0),
        }
    }

    #[test]
    fn test_verification_message_leaves_missing_fields_empty() {
        assert_eq!(
            profile().verification_message(),
            "0x1111111111111111111111111111111111111111:Ada Lovelace:ada@example.com:"
        );
    }

    #[test]
    fn test_verification_hash_is_sha256_hex() {
        let hash = profile().verification_hash_hex();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verification_status_parse_is_case_insensitive() {
        assert_eq!(
            VerificationStatus::from_str("verified"),
            Ok(VerificationStatus::Verified)
        );
        assert!(VerificationStatus::from_str("approved").is_err());
    }
}
