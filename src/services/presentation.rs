// src/services/presentation.rs
//! Presentation builder for credential holders.
//!
//! Derives a partially disclosed credential, stamps it with the current time
//! and signs it with the holder's wallet so a verifier can check possession
//! and freshness.

use crate::disclosure::{DisclosureCodec, SdJwt};
use crate::error::PresentationError;
use crate::models::presentation::{EnvelopeBody, PresentationEnvelope, TokenInfo};
use crate::utils::clock::Clock;
use crate::utils::crypto::{format_address, format_signature};
use crate::utils::serialization::{serialize, to_query_payload};
use crate::wallet::key_management::MessageSigner;
use log::debug;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct PresentationBuilder {
    codec: DisclosureCodec,
    clock: Arc<dyn Clock>,
}

impl PresentationBuilder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        PresentationBuilder {
            codec: DisclosureCodec::educational(),
            clock,
        }
    }

    /// Builds a signed envelope revealing only `requested` claims.
    ///
    /// # Arguments
    /// * `artifact` - The full credential held by the wallet
    /// * `requested` - Redactable claim names to disclose
    /// * `signer` - The holder's wallet
    /// * `token_info` - Token coordinates for an ownership check, if any
    pub fn build(
        &self,
        artifact: &SdJwt,
        requested: &BTreeSet<String>,
        signer: &dyn MessageSigner,
        token_info: Option<TokenInfo>,
    ) -> Result<PresentationEnvelope, PresentationError> {
        let presentation = self.codec.present(artifact, requested)?.to_string();
        let student_address = format_address(signer.address());
        let timestamp = self.clock.now_millis();

        let body = EnvelopeBody {
            student_address: &student_address,
            presentation: &presentation,
            timestamp,
            token_info: token_info.as_ref(),
        };
        let signature = signer.sign_message(&body.signing_bytes()?)?;

        debug!("built presentation disclosing {:?} for {}", requested, student_address);
        Ok(PresentationEnvelope {
            student_address,
            presentation,
            timestamp,
            signature: format_signature(&signature),
            token_info,
        })
    }
}

/// Renders an envelope as the `?data=` payload carried in a QR code.
pub fn to_qr_payload(envelope: &PresentationEnvelope) -> Result<String, PresentationError> {
    Ok(to_query_payload(&serialize(envelope)?))
}
