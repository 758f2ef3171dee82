//! Discord HTTP interactions endpoint and read-only REST API.
//!
//! Discord POSTs every slash-command invocation to `/interactions`, signed
//! with the application's Ed25519 key over `timestamp || body`. Anything
//! that fails verification is rejected with 401 — Discord probes for this
//! at endpoint setup. Verified pings get pongs; commands go to the
//! dispatcher.
//!
//! The REST API exposes read-only governance data. No write endpoints — if
//! you want to act on the DAO, use a slash command.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

use crate::commands::Handler;
use crate::governance::VoteStore;

// Discord interaction request types.
pub const INTERACTION_PING: u8 = 1;
pub const INTERACTION_COMMAND: u8 = 2;

// Discord interaction response types.
pub const RESPONSE_PONG: u8 = 1;
pub const RESPONSE_MESSAGE: u8 = 4;
pub const RESPONSE_DEFERRED: u8 = 5;

/// An incoming interaction, trimmed to the fields we use.
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: u8,
    /// Token for follow-up webhooks.
    pub token: Option<String>,
    pub data: Option<CommandData>,
    pub member: Option<Member>,
    pub user: Option<User>,
}

impl Interaction {
    /// The invoking user: `member.user` in guilds, `user` in DMs.
    pub fn invoker(&self) -> Option<&User> {
        self.member
            .as_ref()
            .map(|m| &m.user)
            .or(self.user.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

impl CommandData {
    pub fn str_option<'a>(options: &'a [CommandOption], name: &str) -> Option<&'a str> {
        options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.value.as_str())
    }

    pub fn int_option(options: &[CommandOption], name: &str) -> Option<i64> {
        options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.value.as_i64())
    }

    /// First subcommand, if the command uses them.
    pub fn subcommand(&self) -> Option<(&str, &[CommandOption])> {
        self.options
            .first()
            .filter(|o| !o.options.is_empty() || o.value.is_null())
            .map(|o| (o.name.as_str(), o.options.as_slice()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

/// Ed25519 verifier for interaction requests.
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    /// Build from the hex public key shown in the Discord developer portal.
    pub fn from_hex(public_key_hex: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(public_key_hex)?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("public key must be 32 bytes"))?;
        let key = VerifyingKey::from_bytes(&bytes)?;
        Ok(Self { key })
    }

    /// Verify a request signature over `timestamp || body`.
    pub fn verify(&self, signature_hex: &str, timestamp: &str, body: &[u8]) -> bool {
        let Ok(sig_bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&sig_bytes) else {
            return false;
        };
        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);
        self.key.verify(&message, &signature).is_ok()
    }
}

/// Shared state for the HTTP server.
pub struct AppState {
    pub verifier: SignatureVerifier,
    pub handler: Arc<Handler>,
    pub store: Arc<VoteStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/v1/health", get(api_health))
        .route("/api/v1/proposals", get(api_proposals))
        .route("/api/v1/proposals/{id}/tally", get(api_tally))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/interactions", post(handle_interaction))
        .merge(api)
        .with_state(state)
}

async fn handle_interaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = header_str(&headers, "x-signature-ed25519");
    let timestamp = header_str(&headers, "x-signature-timestamp");
    let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
        return (StatusCode::UNAUTHORIZED, "missing signature headers").into_response();
    };
    if !state.verifier.verify(signature, timestamp, &body) {
        tracing::warn!("Rejected interaction with bad signature");
        return (StatusCode::UNAUTHORIZED, "invalid request signature").into_response();
    }

    let interaction: Interaction = match serde_json::from_slice(&body) {
        Ok(i) => i,
        Err(e) => {
            tracing::warn!(error = %e, "Undecodable interaction payload");
            return (StatusCode::BAD_REQUEST, "bad payload").into_response();
        }
    };

    match interaction.kind {
        INTERACTION_PING => Json(json!({ "type": RESPONSE_PONG })).into_response(),
        INTERACTION_COMMAND => {
            let response = state.handler.clone().dispatch(interaction).await;
            Json(response).into_response()
        }
        other => {
            tracing::debug!(kind = other, "Ignoring unsupported interaction type");
            Json(json!({
                "type": RESPONSE_MESSAGE,
                "data": crate::output::ephemeral("Unsupported interaction."),
            }))
            .into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ── Read-only REST API ─────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn api_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct ProposalInfo {
    id: i64,
    title: String,
    proposer: String,
    status: &'static str,
    created_at: String,
}

async fn api_proposals(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProposalInfo>>, StatusCode> {
    let proposals = state
        .store
        .proposals()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(
        proposals
            .into_iter()
            .map(|p| ProposalInfo {
                id: p.id,
                title: p.title,
                proposer: p.proposer,
                status: p.status.as_str(),
                created_at: p.created_at,
            })
            .collect(),
    ))
}

#[derive(Serialize)]
struct TallyInfo {
    yes_weight: u64,
    no_weight: u64,
    voters: u64,
}

async fn api_tally(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TallyInfo>, StatusCode> {
    let proposal = state
        .store
        .proposal(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if proposal.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    let tally = state
        .store
        .tally(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(TallyInfo {
        yes_weight: tally.yes_weight,
        no_weight: tally.no_weight,
        voters: tally.voters,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn verifier_pair() -> (SigningKey, SignatureVerifier) {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let verifier = SignatureVerifier {
            key: signing.verifying_key(),
        };
        (signing, verifier)
    }

    #[test]
    fn accepts_valid_signature() {
        let (signing, verifier) = verifier_pair();
        let body = br#"{"type":1}"#;
        let timestamp = "1700000000";
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body);
        let sig = hex::encode(signing.sign(&message).to_bytes());

        assert!(verifier.verify(&sig, timestamp, body));
    }

    #[test]
    fn rejects_tampered_body_and_timestamp() {
        let (signing, verifier) = verifier_pair();
        let body = br#"{"type":1}"#;
        let timestamp = "1700000000";
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body);
        let sig = hex::encode(signing.sign(&message).to_bytes());

        assert!(!verifier.verify(&sig, timestamp, br#"{"type":2}"#));
        assert!(!verifier.verify(&sig, "1700000001", body));
        assert!(!verifier.verify("zz-not-hex", timestamp, body));
        assert!(!verifier.verify("", timestamp, body));
    }

    #[test]
    fn parses_command_interaction() {
        let raw = r#"{
            "type": 2,
            "token": "tok",
            "data": {
                "name": "vote",
                "options": [
                    { "type": 4, "name": "proposal-id", "value": 3 },
                    { "type": 3, "name": "choice", "value": "yes" }
                ]
            },
            "member": { "user": { "id": "42", "username": "alice" } }
        }"#;
        let interaction: Interaction = serde_json::from_str(raw).unwrap();
        assert_eq!(interaction.kind, INTERACTION_COMMAND);
        assert_eq!(interaction.invoker().unwrap().id, "42");

        let data = interaction.data.unwrap();
        assert_eq!(data.name, "vote");
        assert_eq!(CommandData::int_option(&data.options, "proposal-id"), Some(3));
        assert_eq!(CommandData::str_option(&data.options, "choice"), Some("yes"));
    }

    #[test]
    fn parses_subcommand_interaction() {
        let raw = r#"{
            "type": 2,
            "data": {
                "name": "proposal",
                "options": [{
                    "type": 1,
                    "name": "create",
                    "options": [
                        { "type": 3, "name": "title", "value": "fees" },
                        { "type": 3, "name": "description", "value": "cut fees" }
                    ]
                }]
            },
            "user": { "id": "42", "username": "alice" }
        }"#;
        let interaction: Interaction = serde_json::from_str(raw).unwrap();
        let data = interaction.data.unwrap();
        let (sub, options) = data.subcommand().unwrap();
        assert_eq!(sub, "create");
        assert_eq!(CommandData::str_option(options, "title"), Some("fees"));
    }
}
