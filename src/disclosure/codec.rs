// src/disclosure/codec.rs
//! Selective disclosure codec.
//!
//! Encodes a claim set into a signed [`SdJwt`], derives presentations that
//! reveal a subset of the redactable claims, and verifies presentations
//! fail-closed: a single bad disclosure rejects the whole artifact.

use crate::disclosure::sd_jwt::{
    disclosure_digest, CredentialHeader, Disclosure, JwtHeader, SdJwt, JWT_ALG, JWT_TYP, SD_ALG,
};
use crate::error::CodecError;
use crate::models::credential::{
    canonical_rank, ClaimSet, ALWAYS_VISIBLE_CLAIMS, EDUCATIONAL_CREDENTIAL_TYPE, REDACTABLE_CLAIMS,
};
use crate::utils::crypto::{format_address, parse_address, recover_signer};
use crate::utils::serialization::{b64url_decode, b64url_encode, encode_json_segment};
use crate::wallet::key_management::MessageSigner;
use ethers::types::{Address, Signature};
use log::debug;
use rand::{CryptoRng, RngCore};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Salt length in bytes for each disclosure.
const SALT_LEN: usize = 16;

/// Which claims are embedded in the header and which are committed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisclosureLayout {
    always_visible: BTreeSet<String>,
    redactable: BTreeSet<String>,
}

impl DisclosureLayout {
    pub fn new<'a>(
        always_visible: impl IntoIterator<Item = &'a str>,
        redactable: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        DisclosureLayout {
            always_visible: always_visible.into_iter().map(str::to_string).collect(),
            redactable: redactable.into_iter().map(str::to_string).collect(),
        }
    }

    /// University, issuer and token coordinates visible; personal details redactable.
    pub fn educational() -> Self {
        Self::new(ALWAYS_VISIBLE_CLAIMS, REDACTABLE_CLAIMS)
    }

    pub fn is_always_visible(&self, name: &str) -> bool {
        self.always_visible.contains(name)
    }

    pub fn is_redactable(&self, name: &str) -> bool {
        self.redactable.contains(name)
    }

    pub fn always_visible(&self) -> impl Iterator<Item = &str> {
        self.always_visible.iter().map(String::as_str)
    }
}

/// Result of verifying an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    /// Address that signed the header
    pub issuer: Address,
    pub subject_type: String,
    /// Issued-at, seconds since the Unix epoch
    pub issued_at: i64,
    /// Always-visible claims from the signed header
    pub header_claims: ClaimSet,
    /// Redactable claims whose disclosures validated
    pub disclosed: ClaimSet,
    /// Commitments present in the header but not disclosed
    pub withheld: usize,
    /// Hash of the issuer-signed part
    pub content_hash: String,
}

impl VerifiedCredential {
    /// Header claims together with the disclosed ones.
    pub fn claims(&self) -> ClaimSet {
        let mut all = self.header_claims.clone();
        all.extend(&self.disclosed);
        all
    }

    /// Disclosed claim names in canonical display order.
    pub fn disclosed_fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self.disclosed.names().map(str::to_string).collect();
        names.sort_by(|a, b| canonical_rank(a).cmp(&canonical_rank(b)).then_with(|| a.cmp(b)));
        names
    }
}

/// Encoder/decoder for one [`DisclosureLayout`].
#[derive(Debug, Clone)]
pub struct DisclosureCodec {
    layout: DisclosureLayout,
    subject_type: String,
}

impl DisclosureCodec {
    pub fn new(layout: DisclosureLayout, subject_type: &str) -> Self {
        DisclosureCodec {
            layout,
            subject_type: subject_type.to_string(),
        }
    }

    /// Codec for educational credentials.
    pub fn educational() -> Self {
        Self::new(DisclosureLayout::educational(), EDUCATIONAL_CREDENTIAL_TYPE)
    }

    /// Builds and signs a credential from a full claim set.
    ///
    /// Every redactable claim present in `claims` gets a fresh salt drawn from
    /// `rng`; only its commitment enters the signed header.
    ///
    /// # Errors
    /// - `UnlistedClaim` for a claim outside the layout
    /// - `MissingClaim` when an always-visible claim is absent
    /// - `Signing` if the signer fails
    pub fn encode<R: RngCore + CryptoRng + ?Sized>(
        &self,
        claims: &ClaimSet,
        issued_at: i64,
        signer: &dyn MessageSigner,
        rng: &mut R,
    ) -> Result<SdJwt, CodecError> {
        if let Some(name) = claims
            .names()
            .find(|name| !self.layout.is_always_visible(name) && !self.layout.is_redactable(name))
        {
            return Err(CodecError::UnlistedClaim(name.to_string()));
        }
        if let Some(name) = self.layout.always_visible().find(|name| !claims.contains(name)) {
            return Err(CodecError::MissingClaim(name.to_string()));
        }

        let header_claims = claims.restricted_to(self.layout.always_visible());
        let mut disclosures = Vec::new();
        for (name, value) in claims.iter().filter(|(name, _)| self.layout.is_redactable(name)) {
            let mut salt = [0u8; SALT_LEN];
            rng.fill_bytes(&mut salt);
            disclosures.push(Disclosure::new(&b64url_encode(&salt), name, value)?);
        }

        let mut digests: Vec<String> = disclosures.iter().map(Disclosure::digest).collect();
        digests.sort();

        let payload = CredentialHeader {
            iss: format_address(signer.address()),
            subject_type: self.subject_type.clone(),
            iat: issued_at,
            digests,
            digest_alg: SD_ALG.to_string(),
            claims: header_claims,
        };

        let signing_input = format!(
            "{}.{}",
            json_segment(&JwtHeader::credential())?,
            json_segment(&payload)?
        );
        let signature = signer.sign_message(signing_input.as_bytes())?;
        let jwt = format!("{}.{}", signing_input, b64url_encode(&signature.to_vec()));

        debug!(
            "encoded credential with {} visible and {} redactable claims",
            payload.claims.len(),
            disclosures.len()
        );
        Ok(SdJwt::from_parts(
            jwt,
            disclosures.iter().map(|d| d.encoded().to_string()).collect(),
        ))
    }

    /// Derives a presentation revealing only `requested` redactable claims.
    ///
    /// The signed header is reused unchanged; disclosures that are not
    /// requested are dropped while their commitments stay in the header.
    /// Requested names without a matching disclosure are ignored.
    pub fn present(&self, artifact: &SdJwt, requested: &BTreeSet<String>) -> Result<SdJwt, CodecError> {
        let mut kept = Vec::new();
        for encoded in artifact.disclosures() {
            let disclosure = Disclosure::parse(encoded)?;
            if requested.contains(&disclosure.name) {
                kept.push(encoded.clone());
            }
        }
        Ok(artifact.with_disclosures(kept))
    }

    /// Verifies an artifact and recovers its visible and disclosed claims.
    ///
    /// # Errors
    /// - `MalformedArtifact` when the structure or header is invalid
    /// - `BadSignature` when the header signature does not recover to `iss`
    /// - `CommitmentMismatch` when any disclosure is not committed to, or is repeated
    pub fn verify(&self, serialized: &str) -> Result<VerifiedCredential, CodecError> {
        let artifact = SdJwt::parse(serialized)?;

        let jwt_header = artifact.jwt_header()?;
        if jwt_header.alg != JWT_ALG || jwt_header.typ != JWT_TYP {
            return Err(CodecError::MalformedArtifact(format!(
                "unsupported JWT header alg={} typ={}",
                jwt_header.alg, jwt_header.typ
            )));
        }

        let header = artifact.header()?;
        self.check_header(&header)?;
        let issuer = parse_address(&header.iss)
            .map_err(|e| CodecError::MalformedArtifact(format!("iss: {e}")))?;

        self.check_signature(&artifact, issuer)?;

        let committed: HashSet<&str> = header.digests.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let mut disclosed = ClaimSet::new();
        for (index, encoded) in artifact.disclosures().iter().enumerate() {
            let digest = disclosure_digest(encoded);
            if !committed.contains(digest.as_str()) {
                return Err(CodecError::CommitmentMismatch(format!(
                    "disclosure #{index} does not match any commitment"
                )));
            }
            if !seen.insert(digest) {
                return Err(CodecError::CommitmentMismatch(format!(
                    "disclosure #{index} is repeated"
                )));
            }

            let disclosure = Disclosure::parse(encoded)?;
            if !self.layout.is_redactable(&disclosure.name) {
                return Err(CodecError::MalformedArtifact(format!(
                    "claim `{}` cannot be disclosed selectively",
                    disclosure.name
                )));
            }
            if disclosed.contains(&disclosure.name) {
                return Err(CodecError::MalformedArtifact(format!(
                    "claim `{}` disclosed twice",
                    disclosure.name
                )));
            }
            disclosed.insert(&disclosure.name, &disclosure.value);
        }

        Ok(VerifiedCredential {
            issuer,
            subject_type: header.subject_type,
            issued_at: header.iat,
            withheld: committed.len().saturating_sub(disclosed.len()),
            header_claims: header.claims,
            disclosed,
            content_hash: artifact.content_hash(),
        })
    }

    fn check_header(&self, header: &CredentialHeader) -> Result<(), CodecError> {
        if header.digest_alg != SD_ALG {
            return Err(CodecError::MalformedArtifact(format!(
                "unsupported _sd_alg {}",
                header.digest_alg
            )));
        }
        if header.subject_type != self.subject_type {
            return Err(CodecError::MalformedArtifact(format!(
                "unexpected credential type {}",
                header.subject_type
            )));
        }
        if let Some(name) = self.layout.always_visible().find(|name| !header.claims.contains(name)) {
            return Err(CodecError::MalformedArtifact(format!("header is missing `{name}`")));
        }
        if let Some(name) = header.claims.names().find(|name| !self.layout.is_always_visible(name)) {
            return Err(CodecError::MalformedArtifact(format!(
                "header carries unexpected claim `{name}`"
            )));
        }
        Ok(())
    }

    fn check_signature(&self, artifact: &SdJwt, issuer: Address) -> Result<(), CodecError> {
        let bytes = b64url_decode(artifact.signature_segment())
            .map_err(|e| CodecError::BadSignature(format!("signature segment: {e}")))?;
        let signature = Signature::try_from(bytes.as_slice())
            .map_err(|e| CodecError::BadSignature(e.to_string()))?;
        let recovered = recover_signer(artifact.signing_input().as_bytes(), &signature)
            .map_err(|e| CodecError::BadSignature(e.to_string()))?;
        if recovered != issuer {
            return Err(CodecError::BadSignature(format!(
                "header signed by {}, declared issuer {}",
                format_address(recovered),
                format_address(issuer)
            )));
        }
        Ok(())
    }
}

fn json_segment<T: Serialize>(value: &T) -> Result<String, CodecError> {
    encode_json_segment(value)
        .map_err(|e| CodecError::MalformedArtifact(format!("header encoding: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disclosure::sd_jwt::Disclosure;
    use crate::models::credential::*;
    use crate::wallet::key_management::KeyManager;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn full_claims(issuer: &KeyManager) -> ClaimSet {
        ClaimSet::new()
            .with(UNIVERSITY, "X")
            .with(NAME, "Alice")
            .with(DEGREE_LEVEL, "BSc")
            .with(GRADUATION_YEAR, "2024")
            .with(FACULTY, "CS")
            .with(ISSUER_ADDRESS, &format_address(issuer.address()))
            .with(TOKEN_ADDRESS, "0x00000000000000000000000000000000000000aa")
            .with(TOKEN_ID, "7")
    }

    fn encode_full(seed: u64) -> (KeyManager, ClaimSet, SdJwt) {
        let issuer = KeyManager::from_seed(seed);
        let claims = full_claims(&issuer);
        let mut rng = StdRng::seed_from_u64(seed);
        let artifact = DisclosureCodec::educational()
            .encode(&claims, 1_700_000_000, &issuer, &mut rng)
            .unwrap();
        (issuer, claims, artifact)
    }

    fn requested(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    /// Replaces the disclosure for `name` with one built by `tamper`.
    fn tamper_disclosure(artifact: &SdJwt, name: &str, tamper: impl Fn(&Disclosure) -> Disclosure) -> String {
        let replaced = artifact
            .disclosures()
            .iter()
            .map(|encoded| {
                let disclosure = Disclosure::parse(encoded).unwrap();
                if disclosure.name == name {
                    tamper(&disclosure).encoded().to_string()
                } else {
                    encoded.clone()
                }
            })
            .collect();
        artifact.with_disclosures(replaced).to_string()
    }

    fn flip_first_bit(text: &str) -> String {
        let mut bytes = text.as_bytes().to_vec();
        bytes[0] ^= 0x01;
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_full_disclosure_round_trip() {
        let (issuer, claims, artifact) = encode_full(1);
        let verified = DisclosureCodec::educational().verify(&artifact.to_string()).unwrap();

        assert_eq!(verified.claims(), claims);
        assert_eq!(verified.issuer, issuer.address());
        assert_eq!(verified.withheld, 0);
        assert_eq!(verified.issued_at, 1_700_000_000);
    }

    #[test]
    fn test_header_hides_redactable_values() {
        let (_, _, artifact) = encode_full(2);
        let header = artifact.header().unwrap();
        assert_eq!(header.digests.len(), 4);
        assert!(!header.claims.contains(NAME));
        assert!(!artifact.issuer_jwt().contains("Alice"));
        assert_eq!(header.claims.get(UNIVERSITY), Some("X"));
    }

    #[test]
    fn test_every_subset_recovers_exactly_the_request() {
        let (_, claims, artifact) = encode_full(3);
        let codec = DisclosureCodec::educational();
        for mask in 0u8..16 {
            let names: Vec<&str> = REDACTABLE_CLAIMS
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, n)| *n)
                .collect();
            let derived = codec.present(&artifact, &requested(&names)).unwrap();
            let verified = codec.verify(&derived.to_string()).unwrap();

            assert_eq!(verified.disclosed, claims.restricted_to(names.iter().copied()));
            assert_eq!(verified.withheld, 4 - names.len());
            for visible in ALWAYS_VISIBLE_CLAIMS {
                assert!(verified.header_claims.contains(visible));
            }
        }
    }

    #[test]
    fn test_present_ignores_unknown_and_visible_names() {
        let (_, _, artifact) = encode_full(4);
        let codec = DisclosureCodec::educational();
        let derived = codec
            .present(&artifact, &requested(&[NAME, UNIVERSITY, "shoeSize"]))
            .unwrap();
        assert_eq!(derived.disclosures().len(), 1);
        assert_eq!(derived.issuer_jwt(), artifact.issuer_jwt());
    }

    #[test]
    fn test_flipped_salt_bit_is_a_commitment_mismatch() {
        let (_, _, artifact) = encode_full(5);
        let tampered = tamper_disclosure(&artifact, NAME, |d| {
            let mut salt = b64url_decode(&d.salt).unwrap();
            salt[0] ^= 0x01;
            Disclosure::new(&b64url_encode(&salt), &d.name, &d.value).unwrap()
        });
        assert!(matches!(
            DisclosureCodec::educational().verify(&tampered),
            Err(CodecError::CommitmentMismatch(_))
        ));
    }

    #[test]
    fn test_flipped_value_bit_is_a_commitment_mismatch() {
        let (_, _, artifact) = encode_full(6);
        let tampered = tamper_disclosure(&artifact, NAME, |d| {
            Disclosure::new(&d.salt, &d.name, &flip_first_bit(&d.value)).unwrap()
        });
        assert!(matches!(
            DisclosureCodec::educational().verify(&tampered),
            Err(CodecError::CommitmentMismatch(_))
        ));
    }

    #[test]
    fn test_swapped_claim_name_is_a_commitment_mismatch() {
        let (_, _, artifact) = encode_full(7);
        let tampered = tamper_disclosure(&artifact, DEGREE_LEVEL, |d| {
            Disclosure::new(&d.salt, FACULTY, &d.value).unwrap()
        });
        assert!(matches!(
            DisclosureCodec::educational().verify(&tampered),
            Err(CodecError::CommitmentMismatch(_))
        ));
    }

    #[test]
    fn test_repeated_disclosure_is_rejected() {
        let (_, _, artifact) = encode_full(8);
        let mut disclosures = artifact.disclosures().to_vec();
        disclosures.push(disclosures[0].clone());
        let doubled = artifact.with_disclosures(disclosures).to_string();
        assert!(matches!(
            DisclosureCodec::educational().verify(&doubled),
            Err(CodecError::CommitmentMismatch(_))
        ));
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let (_, claims, artifact) = encode_full(9);
        let impostor = KeyManager::from_seed(99);
        let mut rng = StdRng::seed_from_u64(99);
        let forged = DisclosureCodec::educational()
            .encode(&claims, 1_700_000_000, &impostor, &mut rng)
            .unwrap();

        // Keep the genuine payload but attach the impostor's signature
        let genuine_input = artifact.signing_input();
        let forged_jwt = format!("{}.{}", genuine_input, forged.signature_segment());
        let spliced = SdJwt::from_parts(forged_jwt, artifact.disclosures().to_vec());

        assert!(matches!(
            DisclosureCodec::educational().verify(&spliced.to_string()),
            Err(CodecError::BadSignature(_))
        ));
    }

    #[test]
    fn test_edited_header_breaks_signature() {
        let (_, _, artifact) = encode_full(10);
        let mut header = artifact.header().unwrap();
        header.claims.insert(UNIVERSITY, "Y");
        let edited_input = format!(
            "{}.{}",
            encode_json_segment(&JwtHeader::credential()).unwrap(),
            encode_json_segment(&header).unwrap()
        );
        let jwt = format!("{}.{}", edited_input, artifact.signature_segment());
        let edited = SdJwt::from_parts(jwt, artifact.disclosures().to_vec());

        assert!(matches!(
            DisclosureCodec::educational().verify(&edited.to_string()),
            Err(CodecError::BadSignature(_))
        ));
    }

    #[test]
    fn test_missing_header_field_is_malformed() {
        let issuer = KeyManager::from_seed(11);
        let layout = DisclosureLayout::new([UNIVERSITY], REDACTABLE_CLAIMS);
        let narrow = DisclosureCodec::new(layout, EDUCATIONAL_CREDENTIAL_TYPE);
        let claims = ClaimSet::new().with(UNIVERSITY, "X").with(NAME, "Alice");
        let artifact = narrow
            .encode(&claims, 0, &issuer, &mut StdRng::seed_from_u64(11))
            .unwrap();

        assert!(matches!(
            DisclosureCodec::educational().verify(&artifact.to_string()),
            Err(CodecError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            DisclosureCodec::educational().verify("hello world"),
            Err(CodecError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_encode_rejects_incomplete_or_unlisted_claims() {
        let issuer = KeyManager::from_seed(12);
        let codec = DisclosureCodec::educational();
        let mut rng = StdRng::seed_from_u64(12);

        let missing = full_claims(&issuer).restricted_to([UNIVERSITY, NAME, ISSUER_ADDRESS, TOKEN_ID]);
        assert_eq!(
            codec.encode(&missing, 0, &issuer, &mut rng).unwrap_err(),
            CodecError::MissingClaim(TOKEN_ADDRESS.into())
        );

        let extra = full_claims(&issuer).with("gpa", "4.0");
        assert_eq!(
            codec.encode(&extra, 0, &issuer, &mut rng).unwrap_err(),
            CodecError::UnlistedClaim("gpa".into())
        );
    }

    #[test]
    fn test_salts_are_fresh_per_encoding() {
        let issuer = KeyManager::from_seed(13);
        let claims = full_claims(&issuer);
        let codec = DisclosureCodec::educational();
        let mut rng = StdRng::seed_from_u64(13);
        let first = codec.encode(&claims, 0, &issuer, &mut rng).unwrap();
        let second = codec.encode(&claims, 0, &issuer, &mut rng).unwrap();
        assert_ne!(first.disclosures(), second.disclosures());
    }

    #[test]
    fn test_disclosed_fields_use_canonical_order() {
        let (_, _, artifact) = encode_full(14);
        let codec = DisclosureCodec::educational();
        let derived = codec
            .present(&artifact, &requested(&[FACULTY, NAME, DEGREE_LEVEL]))
            .unwrap();
        let verified = codec.verify(&derived.to_string()).unwrap();
        assert_eq!(verified.disclosed_fields(), vec![NAME, DEGREE_LEVEL, FACULTY]);
    }
}
