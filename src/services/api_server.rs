// src/services/api_server.rs
//! API Server for the educational credential service
//!
//! Exposes the issuer, the holder wallet and the verifier over HTTP. The
//! API is built using Axum and includes endpoints for:
//! - Credential issuance and NFT minting
//! - Importing, listing and removing credentials in the holder wallet
//! - Building signed, selectively disclosed presentations
//! - Verifying scanned or pasted presentations

use crate::disclosure::SdJwt;
use crate::error::{IssuanceError, PresentationError, WalletError};
use crate::models::credential::{ClaimSet, TOKEN_ADDRESS};
use crate::models::presentation::{PresentationEnvelope, TokenInfo};
use crate::services::credential_issuer::{CredentialIssuer, IssuanceGrant};
use crate::services::presentation::{to_qr_payload, PresentationBuilder};
use crate::services::verifier::VerificationEngine;
use crate::utils::crypto::parse_address;
use crate::wallet::credential_storage::parse_export;
use crate::wallet::key_management::KeyManager;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

// API request and response structures

/// Request payload for issuing a credential and minting its token
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCredentialRequest {
    /// Identifies the approved issuance; a grant issues once
    grant_id: String,
    claims: ClaimSet,
    /// Graduate's wallet address that receives the NFT
    recipient: String,
    /// Image reference written into the token metadata
    image: String,
}

/// Request payload for building a presentation from a stored credential
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresentRequest {
    token_id: String,
    #[serde(default)]
    disclose: Vec<String>,
    /// Attach token coordinates so the verifier can check ownership
    #[serde(default)]
    include_token_info: bool,
}

/// Response containing a signed envelope and its QR payload
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresentResponse {
    envelope: PresentationEnvelope,
    qr_payload: String,
}

/// Request payload for verifying a presentation
#[derive(Serialize, Deserialize)]
struct VerifyRequest {
    /// QR payload, URL or envelope JSON
    payload: String,
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// API server state containing all service dependencies
pub struct ApiServer {
    /// Service for issuing credentials and minting tokens
    credential_issuer: Arc<CredentialIssuer>,

    /// Service for verifying presentations
    verifier: Arc<VerificationEngine>,

    /// Service for building presentations
    presentation_builder: Arc<PresentationBuilder>,

    /// Holder wallet with its credential store
    key_manager: Arc<KeyManager>,

    /// Grants that have issued their credential, by grant id
    grants: Arc<Mutex<HashMap<String, IssuanceGrant>>>,

    /// Collection used when an issuance request names no `tokenAddress`
    default_contract: Option<String>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    pub fn new(
        credential_issuer: CredentialIssuer,
        verifier: VerificationEngine,
        presentation_builder: PresentationBuilder,
        key_manager: KeyManager,
    ) -> Self {
        ApiServer {
            credential_issuer: Arc::new(credential_issuer),
            verifier: Arc::new(verifier),
            presentation_builder: Arc::new(presentation_builder),
            key_manager: Arc::new(key_manager),
            grants: Arc::new(Mutex::new(HashMap::new())),
            default_contract: None,
        }
    }

    /// Sets the collection new credentials are minted on by default.
    pub fn with_default_contract(mut self, contract: &str) -> Self {
        let contract = contract.trim();
        self.default_contract = (!contract.is_empty()).then(|| contract.to_string());
        self
    }

    /// Configures all API routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/issue-credential", post(Self::issue_credential_handler))
            .route("/import-credential", post(Self::import_credential_handler))
            .route(
                "/credentials",
                get(Self::list_credentials_handler).delete(Self::clear_credentials_handler),
            )
            .route(
                "/credentials/:token_id",
                get(Self::get_credential_handler).delete(Self::remove_credential_handler),
            )
            .route("/present", post(Self::present_handler))
            .route("/verify", post(Self::verify_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    // =====================
    // Issuance
    // =====================

    /// Issues a credential, publishes its metadata and mints its token
    ///
    /// # Endpoint
    /// POST /issue-credential
    ///
    /// # Responses
    /// - 200 OK: Returns the credential export file for the graduate
    /// - 400 Bad Request: Invalid claims or recipient
    /// - 409 Conflict: Grant already issued
    /// - 502 Bad Gateway: Metadata upload or mint failed
    async fn issue_credential_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<IssueCredentialRequest>,
    ) -> Response {
        let recipient = match parse_address(&payload.recipient) {
            Ok(address) => address,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        };

        let mut claims = payload.claims;
        if let (false, Some(contract)) = (claims.contains(TOKEN_ADDRESS), &state.default_contract) {
            claims.insert(TOKEN_ADDRESS, contract);
        }

        // Only grants that produced an artifact are kept, so a rejected
        // request can be retried with corrected claims. The lock is released
        // before any network call.
        let issued = {
            let mut grants = state.grants.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match grants.get_mut(&payload.grant_id) {
                Some(grant) => state.credential_issuer.issue(grant),
                None => {
                    let mut grant = IssuanceGrant::new(payload.grant_id.clone(), claims);
                    let issued = state.credential_issuer.issue(&mut grant);
                    if issued.is_ok() {
                        grants.insert(payload.grant_id.clone(), grant);
                    }
                    issued
                }
            }
        };
        let issued = match issued {
            Ok(issued) => issued,
            Err(e) => return issuance_error(e),
        };

        match state.credential_issuer.deliver(&issued, recipient, &payload.image).await {
            Ok(export) => (StatusCode::OK, Json(export)).into_response(),
            Err(e) => issuance_error(e),
        }
    }

    // =====================
    // Holder wallet
    // =====================

    /// Imports a credential export file into the holder wallet
    ///
    /// # Endpoint
    /// POST /import-credential
    ///
    /// # Responses
    /// - 200 OK: Returns the stored credential with its recovered claims
    /// - 400 Bad Request: Malformed file or an artifact that fails verification
    async fn import_credential_handler(State(state): State<Arc<ApiServer>>, body: String) -> Response {
        let imported = parse_export(&body).and_then(|export| state.key_manager.import_credential(export));
        match imported {
            Ok(stored) => {
                info!("wallet now holds {} credential(s)", state.key_manager.credential_count());
                (StatusCode::OK, Json(stored)).into_response()
            }
            Err(e) => error_response(StatusCode::BAD_REQUEST, e),
        }
    }

    /// Lists the holder's credentials
    ///
    /// # Endpoint
    /// GET /credentials
    async fn list_credentials_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        (StatusCode::OK, Json(state.key_manager.credentials()))
    }

    /// # Endpoint
    /// DELETE /credentials
    async fn clear_credentials_handler(State(state): State<Arc<ApiServer>>) -> StatusCode {
        state.key_manager.clear_credentials();
        StatusCode::NO_CONTENT
    }

    /// # Endpoint
    /// GET /credentials/:token_id
    async fn get_credential_handler(
        State(state): State<Arc<ApiServer>>,
        Path(token_id): Path<String>,
    ) -> Response {
        match state.key_manager.get_credential(&token_id) {
            Some(stored) => (StatusCode::OK, Json(stored)).into_response(),
            None => error_response(StatusCode::NOT_FOUND, WalletError::NotFound(token_id)),
        }
    }

    /// # Endpoint
    /// DELETE /credentials/:token_id
    async fn remove_credential_handler(
        State(state): State<Arc<ApiServer>>,
        Path(token_id): Path<String>,
    ) -> Response {
        if state.key_manager.remove_credential(&token_id) {
            StatusCode::NO_CONTENT.into_response()
        } else {
            error_response(StatusCode::NOT_FOUND, WalletError::NotFound(token_id))
        }
    }

    // =====================
    // Presentation & verification
    // =====================

    /// Builds a signed presentation of a stored credential
    ///
    /// # Endpoint
    /// POST /present
    ///
    /// # Responses
    /// - 200 OK: Returns the envelope and its `?data=` QR payload
    /// - 404 Not Found: No stored credential for the token id
    async fn present_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<PresentRequest>,
    ) -> Response {
        let Some(stored) = state.key_manager.get_credential(&payload.token_id) else {
            return error_response(StatusCode::NOT_FOUND, WalletError::NotFound(payload.token_id));
        };
        let artifact = match SdJwt::parse(&stored.credential.sdjwt) {
            Ok(artifact) => artifact,
            Err(e) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, e),
        };
        let requested: BTreeSet<String> = payload.disclose.into_iter().collect();
        let token_info = payload
            .include_token_info
            .then(|| TokenInfo::from(stored.credential.token.clone()));

        let envelope = state
            .presentation_builder
            .build(&artifact, &requested, state.key_manager.as_ref(), token_info)
            .and_then(|envelope| Ok((to_qr_payload(&envelope)?, envelope)));
        match envelope {
            Ok((qr_payload, envelope)) => {
                (StatusCode::OK, Json(PresentResponse { envelope, qr_payload })).into_response()
            }
            Err(e) => presentation_error(e),
        }
    }

    /// Verifies a presentation
    ///
    /// # Endpoint
    /// POST /verify
    ///
    /// # Responses
    /// - 200 OK: Returns the verification result, including failures
    async fn verify_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<VerifyRequest>,
    ) -> impl IntoResponse {
        let result = state.verifier.verify(&payload.payload).await;
        (StatusCode::OK, Json(result))
    }
}

fn issuance_error(err: IssuanceError) -> Response {
    let status = match &err {
        IssuanceError::AlreadyIssued(_) => StatusCode::CONFLICT,
        IssuanceError::MissingClaim(_)
        | IssuanceError::InvalidClaim { .. }
        | IssuanceError::IssuerMismatch { .. }
        | IssuanceError::Codec(_) => StatusCode::BAD_REQUEST,
        IssuanceError::UploadFailed(_) | IssuanceError::MintFailed(_) | IssuanceError::HashMismatch { .. } => {
            StatusCode::BAD_GATEWAY
        }
    };
    warn!("issuance request failed: {}", err);
    error_response(status, err)
}

fn presentation_error(err: PresentationError) -> Response {
    error_response(StatusCode::UNPROCESSABLE_ENTITY, err)
}

// Implement Clone for ApiServer to use with Axum's State
impl Clone for ApiServer {
    fn clone(&self) -> Self {
        ApiServer {
            credential_issuer: Arc::clone(&self.credential_issuer),
            verifier: Arc::clone(&self.verifier),
            presentation_builder: Arc::clone(&self.presentation_builder),
            key_manager: Arc::clone(&self.key_manager),
            grants: Arc::clone(&self.grants),
            default_contract: self.default_contract.clone(),
        }
    }
}
