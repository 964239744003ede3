//! # Core Domain Entities
//!
//! Defines the entities exchanged between producers, the broker, and the
//! submission worker.
//!
//! ## Clusters
//!
//! - **Transactions**: `SignedTransaction`, `Witness`, `TransactionId`
//! - **Discovery**: `ServiceLocation`
//! - **Lifecycle**: `WorkerStatus`, `HealthCheckResponse`

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;
use std::str::FromStr;

use crate::errors::MalformedTransaction;

// =============================================================================
// CLUSTER A: TRANSACTIONS
// =============================================================================

/// A 32-byte hash.
pub type Hash = [u8; 32];

/// A 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// Identifier of a transaction, derived from its body.
///
/// The lowercase hex rendering is used verbatim as the reply queue name.
/// Two distinct in-flight transactions sharing an identifier would have
/// their replies cross-delivered; uniqueness is a precondition of the
/// correlation layer, not something it arbitrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub Hash);

impl TransactionId {
    /// Raw identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    /// Hex encoding, used as the reply queue name.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for TransactionId {
    type Err = MalformedTransaction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| MalformedTransaction::new(e.to_string()))?;
        let hash: Hash = bytes
            .try_into()
            .map_err(|_| MalformedTransaction::new("transaction id must be 32 bytes"))?;
        Ok(Self(hash))
    }
}

/// A key witness attached to a transaction body.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Signer's public key.
    pub public_key: PublicKey,
    /// Signature over the transaction body.
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

/// A signed transaction envelope as carried on the submission queue.
///
/// Witnesses are excluded from the identifier so that re-signing a body does
/// not change where its reply is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Serialized transaction body.
    pub body: Vec<u8>,
    /// Key witnesses over `body`.
    pub witnesses: Vec<Witness>,
}

impl SignedTransaction {
    /// Compute the transaction identifier (SHA-256 of the body).
    pub fn id(&self) -> TransactionId {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(&self.body);
        TransactionId(hasher.finalize().into())
    }

    /// Encode into the wire format accepted by the submission queue.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing plain byte vectors into a Vec cannot fail.
        bincode::serialize(self).unwrap_or_default()
    }

    /// Decode from the wire format.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, MalformedTransaction> {
        if raw.is_empty() {
            return Err(MalformedTransaction::new("empty payload"));
        }
        let tx: Self =
            bincode::deserialize(raw).map_err(|e| MalformedTransaction::new(e.to_string()))?;
        if tx.body.is_empty() {
            return Err(MalformedTransaction::new("empty transaction body"));
        }
        Ok(tx)
    }
}

// =============================================================================
// CLUSTER B: DISCOVERY
// =============================================================================

/// A concrete network location, either configured or resolved via SRV lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceLocation {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServiceLocation {
    /// Create a new location.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServiceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// =============================================================================
// CLUSTER C: LIFECYCLE
// =============================================================================

/// Status of a submission worker.
///
/// `Connected` is reported only while the connection and channel are open
/// and intake (consumer or poll loop) is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Not connected; the initial and final state.
    #[default]
    Idle,
    /// Opening the broker connection.
    Connecting,
    /// Consuming the submission queue.
    Connected,
    /// The connection was lost; cleanup is in progress.
    Error,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Result of a provider health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Whether the provider can accept submissions.
    pub ok: bool,
}

impl HealthCheckResponse {
    /// A healthy response.
    pub const fn healthy() -> Self {
        Self { ok: true }
    }

    /// An unhealthy response.
    pub const fn unhealthy() -> Self {
        Self { ok: false }
    }
}
