// src/models/verification.rs
//! Verification pipeline outcome types.
//!
//! A verification attempt produces an append-only [`StepLog`] of per-stage
//! outcomes, folded at the end into a [`VerificationResult`]. Cryptographic
//! validity (`success`) and on-chain trust (`trust`) are reported as separate
//! fields and are never merged into one flag.

use crate::models::credential::TokenIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline stages, in execution order.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Parse,
    SignatureCheck,
    FreshnessCheck,
    BindingCheck,
    MetadataCheck,
    ClaimsCheck,
}

/// Every way a verification stage can fail.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    ParseError,
    InvalidSignature,
    Expired,
    BindingFailed,
    MetadataFailed,
    ContentHashMismatch,
    MalformedArtifact,
    BadSignature,
    CommitmentMismatch,
    NoClaimsDisclosed,
}

impl FailureKind {
    /// Terminal failures stop the pipeline; the others only degrade trust.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            FailureKind::BindingFailed | FailureKind::MetadataFailed | FailureKind::ContentHashMismatch
        )
    }

    /// Short message suitable for showing to the person verifying.
    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::ParseError => "invalid format",
            FailureKind::InvalidSignature => "verification failed, signature invalid",
            FailureKind::Expired => "presentation expired, request a new one",
            FailureKind::BindingFailed => "on-chain ownership unconfirmed",
            FailureKind::MetadataFailed => "credential image unavailable",
            FailureKind::ContentHashMismatch => "on-chain content hash does not match this credential",
            FailureKind::MalformedArtifact
            | FailureKind::BadSignature
            | FailureKind::CommitmentMismatch
            | FailureKind::NoClaimsDisclosed => "claims could not be verified",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of one stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StepStatus {
    Skipped { reason: String },
    Completed,
    Failed { kind: FailureKind, reason: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: Step,
    #[serde(flatten)]
    pub status: StepStatus,
}

impl StepOutcome {
    pub fn completed(step: Step) -> Self {
        StepOutcome {
            step,
            status: StepStatus::Completed,
        }
    }

    pub fn skipped(step: Step, reason: impl Into<String>) -> Self {
        StepOutcome {
            step,
            status: StepStatus::Skipped { reason: reason.into() },
        }
    }

    pub fn failed(step: Step, kind: FailureKind, reason: impl Into<String>) -> Self {
        StepOutcome {
            step,
            status: StepStatus::Failed {
                kind,
                reason: reason.into(),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match &self.status {
            StepStatus::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Append-only record of stage outcomes for one verification attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepLog(Vec<StepOutcome>);

impl StepLog {
    /// Returns a log extended by `outcome`; the receiver is consumed.
    #[must_use]
    pub fn append(mut self, outcome: StepOutcome) -> Self {
        self.0.push(outcome);
        self
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.0
    }

    pub fn get(&self, step: Step) -> Option<&StepOutcome> {
        self.0.iter().find(|outcome| outcome.step == step)
    }

    pub fn completed(&self, step: Step) -> bool {
        self.get(step).is_some_and(StepOutcome::is_completed)
    }

    pub fn has_failure(&self, kind: FailureKind) -> bool {
        self.0.iter().any(|outcome| outcome.failure() == Some(kind))
    }

    /// The first terminal failure, if the pipeline halted.
    pub fn terminal_failure(&self) -> Option<&StepOutcome> {
        self.0
            .iter()
            .find(|outcome| outcome.failure().is_some_and(FailureKind::is_terminal))
    }

    pub fn into_outcomes(self) -> Vec<StepOutcome> {
        self.0
    }
}

/// How far the verifier's trust in a presentation extends.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrustLevel {
    /// Claims verified and the presenter currently owns the bound token.
    Full,
    /// Claims verified, but ownership or content binding was not confirmed.
    OwnershipUnconfirmed,
    /// Claims were not verified.
    Unverified,
}

/// Rule that turns a step log into the `success` flag.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TrustPolicy {
    /// Success needs Parse, SignatureCheck, FreshnessCheck and ClaimsCheck.
    /// Binding and metadata failures only lower [`TrustLevel`].
    #[default]
    CryptographicOnly,
    /// Additionally needs a completed BindingCheck and a matching content hash.
    RequireBinding,
}

impl FromStr for TrustPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cryptographic-only" => Ok(TrustPolicy::CryptographicOnly),
            "require-binding" => Ok(TrustPolicy::RequireBinding),
            other => Err(format!("unknown trust policy `{other}`")),
        }
    }
}

/// Verified view of a credential as shown to the verifying party.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub university: String,
    pub issuer_address: String,
    pub token_address: String,
    pub token_id: String,
    /// RFC 3339 issue time from the signed header
    pub issued_at: String,
    /// Content hash of the issuer-signed credential
    pub verification_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graduation_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VerificationError {
    pub kind: FailureKind,
    pub message: String,
    pub detail: String,
}

/// Everything a verification attempt established.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub success: bool,
    pub trust: TrustLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
    pub disclosed_fields: Vec<String>,
    /// Set only when the on-chain binding was confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub steps: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<VerificationError>,
}
