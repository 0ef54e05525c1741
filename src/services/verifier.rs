// src/services/verifier.rs
//! Presentation verification service.
//!
//! Verifies an untrusted presentation (scanned from a QR code or pasted as
//! text) as a linear pipeline:
//!
//! ```text
//! Parse -> SignatureCheck -> FreshnessCheck -> BindingCheck -> MetadataCheck -> ClaimsCheck
//! ```
//!
//! Every stage appends one [`StepOutcome`] to the attempt's [`StepLog`]. A
//! terminal failure ends the pipeline; binding and metadata failures only
//! lower the reported [`TrustLevel`]. Whether the attempt counts as a success
//! is decided in exactly one place, [`overall_success`].

use crate::blockchain::oracle::{parse_token_id, read_binding, BindingOracle};
use crate::disclosure::{DisclosureCodec, SdJwt, VerifiedCredential};
use crate::error::CodecError;
use crate::models::credential::{
    TokenIdentity, TokenMetadata, DEGREE_LEVEL, FACULTY, GRADUATION_YEAR, NAME, TOKEN_ADDRESS, TOKEN_ID,
    UNIVERSITY,
};
use crate::models::presentation::PresentationEnvelope;
use crate::models::verification::{
    Certificate, FailureKind, Step, StepLog, StepOutcome, StepStatus, TrustLevel, TrustPolicy,
    VerificationError, VerificationResult,
};
use crate::storage::{download_json, ContentStore};
use crate::utils::clock::Clock;
use crate::utils::crypto::{format_address, parse_address, parse_signature, verify_message};
use crate::utils::serialization::{deserialize, from_query_payload};
use chrono::{TimeZone, Utc};
use ethers::types::Address;
use log::{debug, warn};
use std::sync::Arc;

/// Maximum presentation age, inclusive.
pub const FRESHNESS_WINDOW_MS: i64 = 300_000;

/// Stages whose completion proves the presentation cryptographically.
const CRYPTOGRAPHIC_STEPS: [Step; 4] = [Step::Parse, Step::SignatureCheck, Step::FreshnessCheck, Step::ClaimsCheck];

/// Decides the `success` flag from a finished step log.
pub fn overall_success(log: &StepLog, policy: TrustPolicy) -> bool {
    let cryptographic = CRYPTOGRAPHIC_STEPS.iter().all(|step| log.completed(*step));
    match policy {
        TrustPolicy::CryptographicOnly => cryptographic,
        TrustPolicy::RequireBinding => {
            cryptographic
                && log.completed(Step::BindingCheck)
                && !log.has_failure(FailureKind::ContentHashMismatch)
        }
    }
}

/// How far the presentation is trusted, independent of policy.
pub fn trust_level(log: &StepLog) -> TrustLevel {
    if !CRYPTOGRAPHIC_STEPS.iter().all(|step| log.completed(*step)) {
        TrustLevel::Unverified
    } else if log.completed(Step::BindingCheck) && !log.has_failure(FailureKind::ContentHashMismatch) {
        TrustLevel::Full
    } else {
        TrustLevel::OwnershipUnconfirmed
    }
}

/// Envelope that survived the parse stage.
struct ParsedPresentation {
    envelope: PresentationEnvelope,
    student: Address,
}

/// On-chain facts established by a completed binding check.
struct ConfirmedBinding {
    token: TokenIdentity,
    content_uri: String,
    collection_name: Option<String>,
}

/// Everything the stages found out, folded into the result at the end.
#[derive(Default)]
struct Findings {
    binding: Option<ConfirmedBinding>,
    image_url: Option<String>,
    credential: Option<VerifiedCredential>,
}

/// Verification engine shared by all verification attempts.
///
/// Holds no per-attempt state; concurrent calls to [`verify`](Self::verify)
/// are independent.
pub struct VerificationEngine {
    codec: DisclosureCodec,
    oracle: Arc<dyn BindingOracle>,
    store: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
    policy: TrustPolicy,
}

impl VerificationEngine {
    pub fn new(
        oracle: Arc<dyn BindingOracle>,
        store: Arc<dyn ContentStore>,
        clock: Arc<dyn Clock>,
        policy: TrustPolicy,
    ) -> Self {
        VerificationEngine {
            codec: DisclosureCodec::educational(),
            oracle,
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> TrustPolicy {
        self.policy
    }

    /// Runs the full pipeline over a raw payload.
    ///
    /// `raw` may be verbatim envelope JSON, a `?data=` query or a full URL
    /// carrying one. Failures are reported inside the result, never as `Err`.
    pub async fn verify(&self, raw: &str) -> VerificationResult {
        let mut findings = Findings::default();

        let (outcome, parsed) = self.parse_step(raw);
        let log = StepLog::default().append(outcome);
        let Some(parsed) = parsed else {
            return self.finish(log, findings);
        };

        let log = log.append(self.signature_step(&parsed));
        if log.terminal_failure().is_some() {
            return self.finish(log, findings);
        }

        let log = log.append(self.freshness_step(&parsed));
        if log.terminal_failure().is_some() {
            return self.finish(log, findings);
        }

        let (outcome, binding) = self.binding_step(&parsed).await;
        let log = log.append(outcome);

        let (outcome, image_url) = self.metadata_step(&parsed, binding.as_ref()).await;
        let log = log.append(outcome);
        findings.binding = binding;
        findings.image_url = image_url;

        let (outcome, credential) = self.claims_step(&parsed);
        let log = log.append(outcome);
        findings.credential = credential;

        self.finish(log, findings)
    }

    fn parse_step(&self, raw: &str) -> (StepOutcome, Option<ParsedPresentation>) {
        let failed = |reason: String| -> (StepOutcome, Option<ParsedPresentation>) {
            (StepOutcome::failed(Step::Parse, FailureKind::ParseError, reason), None)
        };

        let Some(json) = from_query_payload(raw) else {
            return failed("payload carries no data parameter".into());
        };
        let envelope: PresentationEnvelope = match deserialize(&json) {
            Ok(envelope) => envelope,
            Err(e) => return failed(format!("envelope: {e}")),
        };
        let student = match parse_address(&envelope.student_address) {
            Ok(address) => address,
            Err(e) => return failed(format!("studentAddress: {e}")),
        };

        debug!("parsed presentation from {}", envelope.student_address);
        (
            StepOutcome::completed(Step::Parse),
            Some(ParsedPresentation { envelope, student }),
        )
    }

    fn signature_step(&self, parsed: &ParsedPresentation) -> StepOutcome {
        let failed = |reason: String| StepOutcome::failed(Step::SignatureCheck, FailureKind::InvalidSignature, reason);

        let signature = match parse_signature(&parsed.envelope.signature) {
            Ok(signature) => signature,
            Err(e) => return failed(e.to_string()),
        };
        let body = match parsed.envelope.body().signing_bytes() {
            Ok(body) => body,
            Err(e) => return failed(e.to_string()),
        };
        match verify_message(&body, &signature, parsed.student) {
            Ok(()) => StepOutcome::completed(Step::SignatureCheck),
            Err(e) => failed(e.to_string()),
        }
    }

    fn freshness_step(&self, parsed: &ParsedPresentation) -> StepOutcome {
        let Some(age) = self.clock.now_millis().checked_sub(parsed.envelope.timestamp) else {
            return StepOutcome::failed(
                Step::FreshnessCheck,
                FailureKind::Expired,
                format!("timestamp {} is out of range", parsed.envelope.timestamp),
            );
        };
        if age > FRESHNESS_WINDOW_MS {
            return StepOutcome::failed(
                Step::FreshnessCheck,
                FailureKind::Expired,
                format!("presentation is {age} ms old"),
            );
        }
        if age < -FRESHNESS_WINDOW_MS {
            return StepOutcome::failed(
                Step::FreshnessCheck,
                FailureKind::Expired,
                format!("presentation is dated {} ms in the future", -age),
            );
        }
        StepOutcome::completed(Step::FreshnessCheck)
    }

    async fn binding_step(&self, parsed: &ParsedPresentation) -> (StepOutcome, Option<ConfirmedBinding>) {
        let Some(info) = parsed.envelope.token_info.as_ref() else {
            return (StepOutcome::skipped(Step::BindingCheck, "no token info presented"), None);
        };
        match self.confirm_binding(parsed, info.address.as_str(), info.token_id.as_str(), info.chain_id).await {
            Ok(binding) => (StepOutcome::completed(Step::BindingCheck), Some(binding)),
            Err(reason) => {
                debug!("binding check failed: {}", reason);
                (
                    StepOutcome::failed(Step::BindingCheck, FailureKind::BindingFailed, reason),
                    None,
                )
            }
        }
    }

    /// Cross-checks the presented token against the credential header and
    /// the chain. The header is read unverified here; its signature is
    /// checked by the claims stage.
    async fn confirm_binding(
        &self,
        parsed: &ParsedPresentation,
        address: &str,
        token_id: &str,
        chain_id: u64,
    ) -> Result<ConfirmedBinding, String> {
        if chain_id != self.oracle.chain_id() {
            return Err(format!(
                "token is on chain {chain_id}, oracle reads chain {}",
                self.oracle.chain_id()
            ));
        }
        let contract = parse_address(address).map_err(|e| e.to_string())?;
        let token = parse_token_id(token_id).map_err(|e| e.to_string())?;

        let header = SdJwt::parse(&parsed.envelope.presentation)
            .and_then(|artifact| artifact.header())
            .map_err(|e| format!("credential header unreadable: {e}"))?;
        let signed_contract = header.claims.get(TOKEN_ADDRESS).and_then(|value| parse_address(value).ok());
        if signed_contract != Some(contract) {
            return Err("presented token contract differs from the credential".into());
        }
        let signed_token = header.claims.get(TOKEN_ID).and_then(|value| parse_token_id(value).ok());
        if signed_token != Some(token) {
            return Err("presented token id differs from the credential".into());
        }
        let issuer = parse_address(&header.iss).map_err(|e| e.to_string())?;

        let binding = read_binding(self.oracle.as_ref(), contract, token)
            .await
            .map_err(|e| e.to_string())?;
        if binding.holder != parsed.student {
            return Err(format!(
                "token is held by {}, not the presenter",
                format_address(binding.holder)
            ));
        }
        if binding.issuer != issuer {
            return Err(format!(
                "collection is owned by {}, credential was issued by {}",
                format_address(binding.issuer),
                format_address(issuer)
            ));
        }

        let collection_name = match self.oracle.name(contract).await {
            Ok(name) => Some(name),
            Err(e) => {
                debug!("collection name unavailable: {}", e);
                None
            }
        };

        Ok(ConfirmedBinding {
            token: TokenIdentity {
                chain_id,
                address: format_address(contract),
                token_id: token.to_string(),
            },
            content_uri: binding.content_uri,
            collection_name,
        })
    }

    async fn metadata_step(
        &self,
        parsed: &ParsedPresentation,
        binding: Option<&ConfirmedBinding>,
    ) -> (StepOutcome, Option<String>) {
        let Some(binding) = binding else {
            return (
                StepOutcome::skipped(Step::MetadataCheck, "requires a completed binding check"),
                None,
            );
        };
        let failed = |kind: FailureKind, reason: String| -> (StepOutcome, Option<String>) {
            (StepOutcome::failed(Step::MetadataCheck, kind, reason), None)
        };

        let metadata: TokenMetadata = match download_json(self.store.as_ref(), &binding.content_uri).await {
            Ok(metadata) => metadata,
            Err(e) => return failed(FailureKind::MetadataFailed, e.to_string()),
        };

        let presented_hash = match SdJwt::parse(&parsed.envelope.presentation) {
            Ok(artifact) => artifact.content_hash(),
            Err(e) => return failed(FailureKind::MetadataFailed, e.to_string()),
        };
        match metadata.credential_hash.as_deref() {
            Some(pinned) if pinned.eq_ignore_ascii_case(&presented_hash) => {}
            Some(pinned) => {
                return failed(
                    FailureKind::ContentHashMismatch,
                    format!("metadata pins {pinned}, presented credential hashes to {presented_hash}"),
                )
            }
            None => return failed(FailureKind::ContentHashMismatch, "metadata pins no credentialHash".into()),
        }

        let Some(image) = metadata.image.as_deref() else {
            return failed(FailureKind::MetadataFailed, "metadata has no image".into());
        };
        match self.store.resolve_scheme(image) {
            Ok(url) => (StepOutcome::completed(Step::MetadataCheck), Some(url)),
            Err(e) => failed(FailureKind::MetadataFailed, e.to_string()),
        }
    }

    fn claims_step(&self, parsed: &ParsedPresentation) -> (StepOutcome, Option<VerifiedCredential>) {
        let verified = match self.codec.verify(&parsed.envelope.presentation) {
            Ok(verified) => verified,
            Err(e) => {
                let kind = match e {
                    CodecError::BadSignature(_) => FailureKind::BadSignature,
                    CodecError::CommitmentMismatch(_) => FailureKind::CommitmentMismatch,
                    _ => FailureKind::MalformedArtifact,
                };
                return (StepOutcome::failed(Step::ClaimsCheck, kind, e.to_string()), None);
            }
        };
        if verified.disclosed.is_empty() {
            return (
                StepOutcome::failed(
                    Step::ClaimsCheck,
                    FailureKind::NoClaimsDisclosed,
                    "presentation discloses no claims",
                ),
                None,
            );
        }
        (StepOutcome::completed(Step::ClaimsCheck), Some(verified))
    }

    fn finish(&self, log: StepLog, findings: Findings) -> VerificationResult {
        let success = overall_success(&log, self.policy);
        let trust = trust_level(&log);

        let error = if success {
            None
        } else {
            log.terminal_failure()
                .or_else(|| log.outcomes().iter().find(|outcome| outcome.failure().is_some()))
                .and_then(to_error)
        };
        if let Some(error) = &error {
            warn!("verification failed with {}: {}", error.kind, error.detail);
        }

        let (token, collection_name) = match findings.binding {
            Some(binding) => (Some(binding.token), binding.collection_name),
            None => (None, None),
        };
        let disclosed_fields = findings
            .credential
            .as_ref()
            .map(VerifiedCredential::disclosed_fields)
            .unwrap_or_default();

        VerificationResult {
            success,
            trust,
            certificate: findings.credential.as_ref().map(certificate),
            disclosed_fields,
            token,
            collection_name,
            image_url: findings.image_url,
            steps: log.into_outcomes(),
            error,
        }
    }
}

fn to_error(outcome: &StepOutcome) -> Option<VerificationError> {
    match &outcome.status {
        StepStatus::Failed { kind, reason } => Some(VerificationError {
            kind: *kind,
            message: kind.user_message().to_string(),
            detail: reason.clone(),
        }),
        _ => None,
    }
}

fn certificate(credential: &VerifiedCredential) -> Certificate {
    let claims = credential.claims();
    let owned = |name: &str| claims.get(name).map(str::to_string);
    Certificate {
        university: owned(UNIVERSITY).unwrap_or_default(),
        issuer_address: format_address(credential.issuer),
        token_address: owned(TOKEN_ADDRESS).unwrap_or_default(),
        token_id: owned(TOKEN_ID).unwrap_or_default(),
        issued_at: Utc
            .timestamp_opt(credential.issued_at, 0)
            .single()
            .map(|at| at.to_rfc3339())
            .unwrap_or_default(),
        verification_hash: credential.content_hash.clone(),
        name: owned(NAME),
        degree_level: owned(DEGREE_LEVEL),
        graduation_year: owned(GRADUATION_YEAR),
        faculty: owned(FACULTY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disclosure::sd_jwt::Disclosure;
    use crate::models::presentation::{EnvelopeBody, TokenInfo};
    use crate::services::presentation::{to_qr_payload, PresentationBuilder};
    use crate::testing::{artifact_for, MemoryChain, MemoryStore, CHAIN_ID, TOKEN_CONTRACT};
    use crate::utils::clock::FixedClock;
    use crate::utils::crypto::format_signature;
    use crate::utils::serialization::serialize;
    use crate::wallet::key_management::{KeyManager, MessageSigner};
    use ethers::types::U256;
    use std::collections::BTreeSet;

    const NOW_MS: i64 = 1_700_000_000_000;
    const METADATA_URI: &str = "ipfs://QmMeta";

    struct Fixture {
        issuer: KeyManager,
        holder: KeyManager,
        artifact: SdJwt,
        chain: Arc<MemoryChain>,
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let issuer = KeyManager::from_seed(41);
            let holder = KeyManager::from_seed(42);
            let artifact = artifact_for(&issuer, "7");

            let chain = Arc::new(MemoryChain::new(issuer.address()));
            chain.set_token(U256::from(7), holder.address(), METADATA_URI);

            let store = Arc::new(MemoryStore::new());
            store.put(METADATA_URI, &metadata_json(Some(&artifact.content_hash()), Some("ipfs://QmImage")));

            Fixture {
                issuer,
                holder,
                artifact,
                chain,
                store,
                clock: Arc::new(FixedClock::new(NOW_MS)),
            }
        }

        fn engine(&self, policy: TrustPolicy) -> VerificationEngine {
            VerificationEngine::new(self.chain.clone(), self.store.clone(), self.clock.clone(), policy)
        }

        fn present(&self, names: &[&str], token_info: Option<TokenInfo>) -> String {
            let requested: BTreeSet<String> = names.iter().map(|n| n.to_string()).collect();
            let envelope = PresentationBuilder::new(self.clock.clone())
                .build(&self.artifact, &requested, &self.holder, token_info)
                .unwrap();
            to_qr_payload(&envelope).unwrap()
        }

        /// Signs an arbitrary presentation string as the holder.
        fn sign_raw(&self, presentation: &str, token_info: Option<TokenInfo>) -> String {
            self.sign_at(presentation, NOW_MS, token_info)
        }

        fn sign_at(&self, presentation: &str, timestamp: i64, token_info: Option<TokenInfo>) -> String {
            let student_address = format_address(self.holder.address());
            let body = EnvelopeBody {
                student_address: &student_address,
                presentation,
                timestamp,
                token_info: token_info.as_ref(),
            };
            let signature = self.holder.sign_message(&body.signing_bytes().unwrap()).unwrap();
            serialize(&PresentationEnvelope {
                student_address,
                presentation: presentation.to_string(),
                timestamp,
                signature: format_signature(&signature),
                token_info,
            })
            .unwrap()
        }
    }

    fn metadata_json(hash: Option<&str>, image: Option<&str>) -> Vec<u8> {
        serde_json::to_vec(&TokenMetadata {
            name: "Educational Credential #7".into(),
            description: String::new(),
            image: image.map(str::to_string),
            credential_hash: hash.map(str::to_string),
            attributes: Vec::new(),
        })
        .unwrap()
    }

    fn token_info() -> Option<TokenInfo> {
        Some(TokenInfo {
            address: TOKEN_CONTRACT.into(),
            token_id: "7".into(),
            chain_id: CHAIN_ID,
        })
    }

    fn step_kinds(result: &VerificationResult) -> Vec<(Step, Option<FailureKind>)> {
        result.steps.iter().map(|o| (o.step, o.failure())).collect()
    }

    fn failure_of(result: &VerificationResult, step: Step) -> Option<FailureKind> {
        result.steps.iter().find(|o| o.step == step).and_then(StepOutcome::failure)
    }

    #[tokio::test]
    async fn test_end_to_end_selective_presentation() {
        let f = Fixture::new();
        let payload = f.present(&[NAME, DEGREE_LEVEL], token_info());

        let result = f.engine(TrustPolicy::CryptographicOnly).verify(&payload).await;

        assert!(result.success);
        assert_eq!(result.trust, TrustLevel::Full);
        assert_eq!(result.disclosed_fields, vec![NAME, DEGREE_LEVEL]);
        assert!(result.steps.iter().all(StepOutcome::is_completed));
        assert_eq!(result.steps.len(), 6);
        assert!(result.error.is_none());

        let certificate = result.certificate.unwrap();
        assert_eq!(certificate.university, "X");
        assert_eq!(certificate.name.as_deref(), Some("Alice"));
        assert_eq!(certificate.degree_level.as_deref(), Some("BSc"));
        assert_eq!(certificate.graduation_year, None);
        assert_eq!(certificate.faculty, None);
        assert_eq!(certificate.issuer_address, format_address(f.issuer.address()));
        assert_eq!(certificate.verification_hash, f.artifact.content_hash());
        assert_eq!(certificate.issued_at, "2023-11-14T22:13:20+00:00");

        assert_eq!(result.image_url.as_deref(), Some("https://gateway.test/ipfs/QmImage"));
        assert_eq!(result.token.unwrap().token_id, "7");
        assert_eq!(result.collection_name.as_deref(), Some("X University Diplomas"));
    }

    #[tokio::test]
    async fn test_verbatim_json_payload_is_accepted() {
        let f = Fixture::new();
        let payload = f.present(&[NAME], None);
        let json = from_query_payload(&payload).unwrap();

        let result = f.engine(TrustPolicy::CryptographicOnly).verify(&json).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_freshness_window_is_inclusive() {
        let f = Fixture::new();
        let payload = f.present(&[NAME], None);
        let engine = f.engine(TrustPolicy::CryptographicOnly);

        f.clock.set(NOW_MS + FRESHNESS_WINDOW_MS);
        assert!(engine.verify(&payload).await.success);

        f.clock.set(NOW_MS + FRESHNESS_WINDOW_MS + 1);
        let result = engine.verify(&payload).await;
        assert!(!result.success);
        assert_eq!(result.error.as_ref().unwrap().kind, FailureKind::Expired);
        assert_eq!(
            step_kinds(&result),
            vec![
                (Step::Parse, None),
                (Step::SignatureCheck, None),
                (Step::FreshnessCheck, Some(FailureKind::Expired)),
            ]
        );
    }

    #[tokio::test]
    async fn test_replayed_presentation_expires() {
        let f = Fixture::new();
        let payload = f.present(&[NAME, DEGREE_LEVEL], token_info());
        let engine = f.engine(TrustPolicy::CryptographicOnly);
        assert!(engine.verify(&payload).await.success);

        f.clock.advance(10 * 60 * 1000);
        let replay = engine.verify(&payload).await;
        assert!(!replay.success);
        assert_eq!(replay.trust, TrustLevel::Unverified);
        assert!(replay.certificate.is_none());
        assert_eq!(
            replay.error.map(|e| e.message),
            Some(FailureKind::Expired.user_message().to_string())
        );
    }

    #[tokio::test]
    async fn test_future_timestamps() {
        let f = Fixture::new();
        let payload = f.present(&[NAME], None);
        let engine = f.engine(TrustPolicy::CryptographicOnly);

        f.clock.set(NOW_MS - 1_000);
        assert!(engine.verify(&payload).await.success);

        f.clock.set(NOW_MS - FRESHNESS_WINDOW_MS - 1);
        let result = engine.verify(&payload).await;
        assert_eq!(failure_of(&result, Step::FreshnessCheck), Some(FailureKind::Expired));
    }

    #[tokio::test]
    async fn test_extreme_timestamps_expire() {
        let f = Fixture::new();
        let presentation = f
            .artifact
            .with_disclosures(f.artifact.disclosures()[..1].to_vec())
            .to_string();
        let engine = f.engine(TrustPolicy::CryptographicOnly);

        for timestamp in [i64::MIN, i64::MAX] {
            let result = engine.verify(&f.sign_at(&presentation, timestamp, None)).await;
            assert!(!result.success, "{timestamp}");
            assert_eq!(
                step_kinds(&result),
                vec![
                    (Step::Parse, None),
                    (Step::SignatureCheck, None),
                    (Step::FreshnessCheck, Some(FailureKind::Expired)),
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_zero_disclosure_is_rejected() {
        let f = Fixture::new();
        let payload = f.present(&[], token_info());

        let result = f.engine(TrustPolicy::CryptographicOnly).verify(&payload).await;
        assert!(!result.success);
        assert_eq!(result.trust, TrustLevel::Unverified);
        assert_eq!(failure_of(&result, Step::ClaimsCheck), Some(FailureKind::NoClaimsDisclosed));
        assert!(result.disclosed_fields.is_empty());
    }

    #[tokio::test]
    async fn test_binding_failure_does_not_change_success() {
        let f = Fixture::new();
        f.chain.set_token(U256::from(7), KeyManager::from_seed(43).address(), METADATA_URI);
        let payload = f.present(&[NAME, DEGREE_LEVEL], token_info());

        let result = f.engine(TrustPolicy::CryptographicOnly).verify(&payload).await;
        assert!(result.success);
        assert_eq!(failure_of(&result, Step::BindingCheck), Some(FailureKind::BindingFailed));
        assert_eq!(result.trust, TrustLevel::OwnershipUnconfirmed);
        assert!(result.token.is_none());
        assert!(matches!(
            result.steps.iter().find(|o| o.step == Step::MetadataCheck).map(|o| &o.status),
            Some(StepStatus::Skipped { .. })
        ));
        assert_eq!(result.disclosed_fields, vec![NAME, DEGREE_LEVEL]);

        let strict = f.engine(TrustPolicy::RequireBinding).verify(&payload).await;
        assert!(!strict.success);
        assert_eq!(strict.error.unwrap().kind, FailureKind::BindingFailed);
    }

    #[tokio::test]
    async fn test_unreachable_chain_is_binding_failure() {
        let f = Fixture::new();
        f.chain.set_unreachable(true);
        let payload = f.present(&[NAME], token_info());

        let result = f.engine(TrustPolicy::CryptographicOnly).verify(&payload).await;
        assert!(result.success);
        assert_eq!(failure_of(&result, Step::BindingCheck), Some(FailureKind::BindingFailed));
        assert!(result.collection_name.is_none());
    }

    #[tokio::test]
    async fn test_missing_token_info_skips_binding() {
        let f = Fixture::new();
        let payload = f.present(&[NAME], None);

        let result = f.engine(TrustPolicy::CryptographicOnly).verify(&payload).await;
        assert!(result.success);
        assert_eq!(result.trust, TrustLevel::OwnershipUnconfirmed);
        assert!(!result.steps.iter().any(|o| o.failure().is_some()));

        assert!(!f.engine(TrustPolicy::RequireBinding).verify(&payload).await.success);
    }

    #[tokio::test]
    async fn test_binding_checks_chain_contract_and_issuer() {
        let f = Fixture::new();
        let engine = f.engine(TrustPolicy::CryptographicOnly);

        let wrong_chain = Some(TokenInfo {
            chain_id: 1,
            ..token_info().unwrap()
        });
        let result = engine.verify(&f.present(&[NAME], wrong_chain)).await;
        assert_eq!(failure_of(&result, Step::BindingCheck), Some(FailureKind::BindingFailed));

        let other_token = Some(TokenInfo {
            token_id: "8".into(),
            ..token_info().unwrap()
        });
        f.chain.set_token(U256::from(8), f.holder.address(), METADATA_URI);
        let result = engine.verify(&f.present(&[NAME], other_token)).await;
        assert_eq!(failure_of(&result, Step::BindingCheck), Some(FailureKind::BindingFailed));

        let impostor_chain = Arc::new(MemoryChain::new(KeyManager::from_seed(44).address()));
        impostor_chain.set_token(U256::from(7), f.holder.address(), METADATA_URI);
        let impostor = VerificationEngine::new(
            impostor_chain,
            f.store.clone(),
            f.clock.clone(),
            TrustPolicy::CryptographicOnly,
        );
        let result = impostor.verify(&f.present(&[NAME], token_info())).await;
        assert_eq!(failure_of(&result, Step::BindingCheck), Some(FailureKind::BindingFailed));
    }

    #[tokio::test]
    async fn test_content_hash_mismatch_degrades_trust() {
        let f = Fixture::new();
        f.store.put(METADATA_URI, &metadata_json(Some("0xdeadbeef"), Some("ipfs://QmImage")));
        let payload = f.present(&[NAME], token_info());

        let result = f.engine(TrustPolicy::CryptographicOnly).verify(&payload).await;
        assert!(result.success);
        assert_eq!(result.trust, TrustLevel::OwnershipUnconfirmed);
        assert_eq!(failure_of(&result, Step::MetadataCheck), Some(FailureKind::ContentHashMismatch));

        let strict = f.engine(TrustPolicy::RequireBinding).verify(&payload).await;
        assert!(!strict.success);
        assert_eq!(strict.error.unwrap().kind, FailureKind::ContentHashMismatch);
    }

    #[tokio::test]
    async fn test_unavailable_metadata_is_cosmetic() {
        let f = Fixture::new();
        f.chain.set_token(U256::from(7), f.holder.address(), "ipfs://QmGone");
        let payload = f.present(&[NAME], token_info());

        let result = f.engine(TrustPolicy::RequireBinding).verify(&payload).await;
        assert!(result.success);
        assert_eq!(result.trust, TrustLevel::Full);
        assert_eq!(failure_of(&result, Step::MetadataCheck), Some(FailureKind::MetadataFailed));
        assert!(result.image_url.is_none());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_tampered_disclosure_is_commitment_mismatch() {
        let f = Fixture::new();
        let tampered: Vec<String> = f
            .artifact
            .disclosures()
            .iter()
            .map(|encoded| {
                let d = Disclosure::parse(encoded).unwrap();
                if d.name == NAME {
                    Disclosure::new(&d.salt, &d.name, "Mallory").unwrap().encoded().to_string()
                } else {
                    encoded.clone()
                }
            })
            .collect();
        let presentation = f.artifact.with_disclosures(tampered).to_string();
        let payload = f.sign_raw(&presentation, None);

        let result = f.engine(TrustPolicy::CryptographicOnly).verify(&payload).await;
        assert!(!result.success);
        assert_eq!(failure_of(&result, Step::ClaimsCheck), Some(FailureKind::CommitmentMismatch));
        assert_eq!(
            result.error.unwrap().message,
            "claims could not be verified"
        );
    }

    #[tokio::test]
    async fn test_garbled_credential_is_malformed() {
        let f = Fixture::new();
        let payload = f.sign_raw("not-a-credential", None);

        let result = f.engine(TrustPolicy::CryptographicOnly).verify(&payload).await;
        assert_eq!(failure_of(&result, Step::ClaimsCheck), Some(FailureKind::MalformedArtifact));
    }

    #[tokio::test]
    async fn test_envelope_signed_by_someone_else() {
        let f = Fixture::new();
        let payload = f.present(&[NAME], None);
        let json = from_query_payload(&payload).unwrap();
        let mut envelope: PresentationEnvelope = serde_json::from_str(&json).unwrap();
        envelope.student_address = format_address(KeyManager::from_seed(45).address());

        let result = f
            .engine(TrustPolicy::CryptographicOnly)
            .verify(&serialize(&envelope).unwrap())
            .await;
        assert!(!result.success);
        assert_eq!(
            step_kinds(&result),
            vec![(Step::Parse, None), (Step::SignatureCheck, Some(FailureKind::InvalidSignature))]
        );
    }

    #[tokio::test]
    async fn test_unparseable_payloads() {
        let f = Fixture::new();
        let engine = f.engine(TrustPolicy::CryptographicOnly);

        for raw in [
            "hello",
            "?other=1",
            r#"{"studentAddress":"0x01","timestamp":1,"signature":"0x"}"#,
            r#"{"studentAddress":"alice","presantation":"a.b.c~","timestamp":1,"signature":"0x"}"#,
        ] {
            let result = engine.verify(raw).await;
            assert!(!result.success, "{raw}");
            assert_eq!(step_kinds(&result), vec![(Step::Parse, Some(FailureKind::ParseError))]);
            assert_eq!(result.error.unwrap().message, "invalid format");
        }
    }

    #[test]
    fn test_overall_success_by_policy() {
        let crypto_ok = StepLog::default()
            .append(StepOutcome::completed(Step::Parse))
            .append(StepOutcome::completed(Step::SignatureCheck))
            .append(StepOutcome::completed(Step::FreshnessCheck));
        let unbound = crypto_ok
            .clone()
            .append(StepOutcome::skipped(Step::BindingCheck, "no token info"))
            .append(StepOutcome::skipped(Step::MetadataCheck, "no binding"))
            .append(StepOutcome::completed(Step::ClaimsCheck));
        let bound = crypto_ok
            .append(StepOutcome::completed(Step::BindingCheck))
            .append(StepOutcome::completed(Step::MetadataCheck))
            .append(StepOutcome::completed(Step::ClaimsCheck));

        assert!(overall_success(&unbound, TrustPolicy::CryptographicOnly));
        assert!(!overall_success(&unbound, TrustPolicy::RequireBinding));
        assert!(overall_success(&bound, TrustPolicy::RequireBinding));
        assert_eq!(trust_level(&bound), TrustLevel::Full);
        assert_eq!(trust_level(&unbound), TrustLevel::OwnershipUnconfirmed);
        assert_eq!(trust_level(&StepLog::default()), TrustLevel::Unverified);
    }
}
