//! Completion attestations: claim validation, the canonical signed message,
//! and signature recovery shared by every verifier.

use std::str::FromStr;

use ethers_core::types::{Address, Signature, H256, U256};
use ethers_core::utils::{hash_message, secret_key_to_address};
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};

use crate::error::AttestationError;

/// Fixed tag prefixing every canonical completion message.
pub const MESSAGE_TAG: &str = "VESCROW_TASK_COMPLETE";

/// Status reported for an attestation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Disputed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = AttestationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "disputed" => Ok(Self::Disputed),
            other => Err(AttestationError::UnknownStatus(other.to_string())),
        }
    }
}

/// A non-negative integer that arrives either as a JSON number or as a
/// decimal string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Numeric {
    Int(u64),
    Text(String),
}

impl Numeric {
    pub fn parse(&self, field: &'static str) -> Result<u64, AttestationError> {
        match self {
            Self::Int(n) => Ok(*n),
            Self::Text(s) => {
                let invalid = || AttestationError::InvalidNumber {
                    field,
                    value: s.clone(),
                };
                if !is_decimal(s) {
                    return Err(invalid());
                }
                s.parse().map_err(|_| invalid())
            }
        }
    }
}

/// Completion claim as posted by a worker. Every field is required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub chain_id: Numeric,
    pub agreement_id: Numeric,
    pub worker: String,
    pub tx_hash: String,
    pub completed_at: Numeric,
    pub target: String,
    pub key: String,
    pub value: String,
    pub signature: String,
}

/// Wire form of an attestation's status, as served by the store and
/// consumed by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub chain_id: u64,
    pub agreement_id: u64,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispute_reason: Option<String>,
}

impl StatusReport {
    /// A report carrying nothing but a status.
    pub fn bare(chain_id: u64, agreement_id: u64, status: TaskStatus) -> Self {
        Self {
            chain_id,
            agreement_id,
            status,
            worker: None,
            tx_hash: None,
            completed_at: None,
            target: None,
            key: None,
            value: None,
            signature: None,
            dispute_reason: None,
        }
    }

    /// Rebuilds the validated completion from the reported fields.
    pub fn completion(&self) -> Result<Completion, AttestationError> {
        Completion::from_parts(
            self.chain_id,
            self.agreement_id,
            required(&self.worker, "worker")?,
            required(&self.tx_hash, "txHash")?,
            self.completed_at
                .ok_or(AttestationError::MissingField("completedAt"))?,
            required(&self.target, "target")?,
            required(&self.key, "key")?,
            required(&self.value, "value")?,
            required(&self.signature, "signature")?,
        )
    }
}

/// A shape-validated completion claim.
///
/// `key` and `value` keep the exact decimal text that was signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub chain_id: u64,
    pub agreement_id: u64,
    pub worker: Address,
    pub tx_hash: H256,
    pub completed_at: u64,
    pub target: Address,
    pub key: String,
    pub value: String,
    pub signature: Signature,
}

impl TryFrom<&ClaimRequest> for Completion {
    type Error = AttestationError;

    fn try_from(claim: &ClaimRequest) -> Result<Self, Self::Error> {
        Self::from_parts(
            claim.chain_id.parse("chainId")?,
            claim.agreement_id.parse("agreementId")?,
            &claim.worker,
            &claim.tx_hash,
            claim.completed_at.parse("completedAt")?,
            &claim.target,
            &claim.key,
            &claim.value,
            &claim.signature,
        )
    }
}

impl Completion {
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        chain_id: u64,
        agreement_id: u64,
        worker: &str,
        tx_hash: &str,
        completed_at: u64,
        target: &str,
        key: &str,
        value: &str,
        signature: &str,
    ) -> Result<Self, AttestationError> {
        Ok(Self {
            chain_id,
            agreement_id,
            worker: parse_address("worker", worker)?,
            tx_hash: parse_hash("txHash", tx_hash)?,
            completed_at,
            target: parse_address("target", target)?,
            key: parse_decimal("key", key)?.1,
            value: parse_decimal("value", value)?.1,
            signature: parse_signature("signature", signature)?,
        })
    }

    pub fn key_word(&self) -> U256 {
        // validated at construction
        U256::from_dec_str(&self.key).unwrap_or_default()
    }

    pub fn value_word(&self) -> U256 {
        U256::from_dec_str(&self.value).unwrap_or_default()
    }

    pub fn canonical_message(&self) -> String {
        canonical_message(
            self.chain_id,
            self.agreement_id,
            self.target,
            &self.key,
            &self.value,
            self.tx_hash,
            self.completed_at,
        )
    }

    /// Whether the signature recovers to `worker` over the canonical message.
    pub fn is_signed_by_worker(&self) -> bool {
        recover_signer(&self.canonical_message(), &self.signature)
            .is_some_and(|signer| signer == self.worker)
    }
}

/// Builds the message a worker signs for a completion.
///
/// Field order, `name=value` pairs, the `|` separator and lowercase hex for
/// the target and hash are all significant.
pub fn canonical_message(
    chain_id: u64,
    agreement_id: u64,
    target: Address,
    key: &str,
    value: &str,
    tx_hash: H256,
    completed_at: u64,
) -> String {
    format!(
        "{MESSAGE_TAG}|chainId={chain_id}|agreementId={agreement_id}|target={target:#x}|key={key}|value={value}|txHash={tx_hash:#x}|completedAt={completed_at}"
    )
}

/// Signs `message` as an EIP-191 personal message.
pub fn sign_message(key: &SigningKey, message: &str) -> Result<Signature, k256::ecdsa::Error> {
    let digest = hash_message(message);
    let (signature, recovery_id) = key.sign_prehash_recoverable(digest.as_bytes())?;
    let bytes = signature.to_bytes();
    Ok(Signature {
        r: U256::from_big_endian(&bytes[..32]),
        s: U256::from_big_endian(&bytes[32..]),
        v: u64::from(recovery_id.to_byte()) + 27,
    })
}

/// Recovers the EIP-191 signer of `message`, or `None` if the signature is
/// unusable.
pub fn recover_signer(message: &str, signature: &Signature) -> Option<Address> {
    signature.recover(message.as_bytes().to_vec()).ok()
}

/// Address controlled by `key`.
pub fn address_of(key: &SigningKey) -> Address {
    secret_key_to_address(key)
}

/// Hex encoding of a signature as carried in claims.
pub fn signature_hex(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.to_vec()))
}

/// Parses a 20-byte hex address, with or without `0x`.
pub fn parse_address(field: &'static str, s: &str) -> Result<Address, AttestationError> {
    let invalid = || AttestationError::InvalidAddress {
        field,
        value: s.to_string(),
    };
    let digits = strip_0x(s);
    if digits.len() != 40 {
        return Err(invalid());
    }
    let bytes = hex::decode(digits).map_err(|_| invalid())?;
    Ok(Address::from_slice(&bytes))
}

/// Parses a 32-byte hex hash, with or without `0x`.
pub fn parse_hash(field: &'static str, s: &str) -> Result<H256, AttestationError> {
    let invalid = || AttestationError::InvalidHash {
        field,
        value: s.to_string(),
    };
    let digits = strip_0x(s);
    if digits.len() != 64 {
        return Err(invalid());
    }
    let bytes = hex::decode(digits).map_err(|_| invalid())?;
    Ok(H256::from_slice(&bytes))
}

/// Parses a 65-byte `r || s || v` hex signature, with or without `0x`.
pub fn parse_signature(field: &'static str, s: &str) -> Result<Signature, AttestationError> {
    let invalid = || AttestationError::InvalidSignature { field };
    let bytes = hex::decode(strip_0x(s)).map_err(|_| invalid())?;
    if bytes.len() != 65 {
        return Err(invalid());
    }
    Signature::try_from(bytes.as_slice()).map_err(|_| invalid())
}

/// Validates a non-negative decimal integer that fits 256 bits, returning
/// both the parsed word and the original text.
pub fn parse_decimal(field: &'static str, s: &str) -> Result<(U256, String), AttestationError> {
    let invalid = || AttestationError::InvalidNumber {
        field,
        value: s.to_string(),
    };
    if !is_decimal(s) {
        return Err(invalid());
    }
    let word = U256::from_dec_str(s).map_err(|_| invalid())?;
    Ok((word, s.to_string()))
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn required<'a>(
    field: &'a Option<String>,
    name: &'static str,
) -> Result<&'a str, AttestationError> {
    field
        .as_deref()
        .ok_or(AttestationError::MissingField(name))
}
