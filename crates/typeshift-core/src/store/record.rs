//! Applied-migration records.

use crate::error::Error;
use crate::migration::emit::Script;
use crate::migration::plan::{as_hex, MigrationPlan};
use crate::migration::SafetyGrade;
use rkyv::Archive;
use serde::Serialize;

/// How a migration was accepted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Applied without destructive changes.
    Applied,
    /// Applied with destructive changes allowed explicitly.
    Forced,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStatus::Applied => write!(f, "applied"),
            MigrationStatus::Forced => write!(f, "forced"),
        }
    }
}

/// A migration committed to the revision store.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub struct MigrationRecord {
    /// Migration ID.
    #[serde(serialize_with = "as_hex")]
    pub id: [u8; 16],
    /// Source revision.
    pub from_revision: u64,
    /// Target revision.
    pub to_revision: u64,
    /// Fingerprint of the source schema.
    #[serde(serialize_with = "as_hex")]
    pub from_fingerprint: [u8; 32],
    /// Fingerprint of the target schema.
    #[serde(serialize_with = "as_hex")]
    pub to_fingerprint: [u8; 32],
    /// Overall safety grade.
    pub grade: SafetyGrade,
    /// Checksum of the script.
    #[serde(serialize_with = "as_hex")]
    pub checksum: [u8; 32],
    /// The script that was emitted.
    pub script: String,
    /// Acceptance status.
    pub status: MigrationStatus,
    /// When the migration was committed (microseconds since epoch).
    pub applied_at: u64,
}

impl MigrationRecord {
    /// Record a plan and its script as applied now.
    pub fn new(plan: &MigrationPlan, script: &Script) -> Self {
        let status = if plan.grade.overall_grade == SafetyGrade::D {
            MigrationStatus::Forced
        } else {
            MigrationStatus::Applied
        };
        Self {
            id: plan.id,
            from_revision: plan.from_revision,
            to_revision: plan.to_revision,
            from_fingerprint: plan.from_fingerprint,
            to_fingerprint: plan.to_fingerprint,
            grade: plan.grade.overall_grade,
            checksum: script.checksum,
            script: script.render(),
            status,
            applied_at: current_timestamp(),
        }
    }

    /// Hex form of the ID.
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Serialize the record to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
