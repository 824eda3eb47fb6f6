//! Realtime gate: WebSocket handshake and connection lifecycle.
//!
//! Per connection: `Connecting -> Authenticated -> Closed`, with a degraded
//! `Connecting -> Unauthenticated-admitted -> Closed` path. A connection
//! presenting no credential at all is admitted without identity - it can
//! receive nothing and its sends are dropped. A connection presenting an
//! invalid credential is rejected before the upgrade. This asymmetry is
//! intentional and pending product confirmation; both arms live in
//! `admit` so a decision is a one-line change.

use crate::metrics::{self, ConnectionMetricsGuard};
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use courier_auth::{
    extract_credential, AuthError, CredentialLocations, CredentialSource, TokenVerifier,
};
use courier_core::ClientHandle;
use courier_protocol::{codec, ClientEvent, ServerEvent, UserId};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Query parameter carrying the explicit handshake auth field.
const AUTH_PARAM: &str = "token";

/// Decide admission for a new connection.
///
/// - No credential in any source: admitted without identity.
/// - Credential present and valid: admitted with the bound identity.
/// - Credential present and invalid: rejected.
pub(crate) fn admit(
    verifier: &TokenVerifier,
    sources: &[CredentialSource],
    locations: &CredentialLocations<'_>,
) -> Result<Option<UserId>, AuthError> {
    match extract_credential(sources, locations) {
        None => Ok(None),
        Some(token) => verifier.verify(&token).map(Some),
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let locations = CredentialLocations {
        auth_param: params.get(AUTH_PARAM).map(String::as_str),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
        cookie: headers.get(header::COOKIE).and_then(|v| v.to_str().ok()),
    };

    match admit(&state.verifier, &state.config.auth.sources, &locations) {
        Ok(identity) => {
            if identity.is_none() {
                // Policy: a credential-less connection is admitted in a
                // degraded, receive-nothing state rather than rejected.
                info!("Admitting connection without identity");
            }
            ws.on_upgrade(move |socket| handle_connection(socket, state, identity))
        }
        Err(e) => {
            warn!(error = %e, "Handshake rejected");
            metrics::record_error("handshake");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Authentication error" })),
            )
                .into_response()
        }
    }
}

/// Drive one upgraded connection until it closes.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>, identity: Option<UserId>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (handle, mut outbound) = ClientHandle::channel();
    debug!(connection = %handle.id(), authenticated = identity.is_some(), "Connection established");

    if let Some(user) = identity {
        if let Some(superseded) = state.presence.register(user, handle.clone()) {
            debug!(user = %user, stale = %superseded.id(), "Presence superseded");
        }
        metrics::set_online_users(state.presence.online_count());
    }

    // Connected event goes through the same outbound queue as every push.
    let _ = handle.push(ServerEvent::connected(
        handle.id().as_str(),
        state.config.realtime.heartbeat_interval_ms,
    ));

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            biased;

            // Events queued for this connection (pushes, pongs, control).
            event = outbound.recv() => {
                let Some(event) = event else { break };
                match codec::encode_server(&event) {
                    Ok(text) => {
                        metrics::record_message(text.len(), "outbound");
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(connection = %handle.id(), error = %e, "Outbound encoding failed");
                    }
                }
            }

            // Inbound frames from the client.
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_message(text.len(), "inbound");
                        handle_frame(&text, identity, &state, &handle).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        // Treat binary as UTF-8 text for lenient clients.
                        metrics::record_message(data.len(), "inbound");
                        if let Ok(text) = String::from_utf8(data) {
                            handle_frame(&text, identity, &state, &handle).await;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %handle.id(), "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %handle.id(), error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %handle.id(), "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Unconditional: removal matches on connection identity, so this is a
    // no-op for superseded or never-registered connections.
    state.presence.unregister(&handle);
    metrics::set_online_users(state.presence.online_count());

    debug!(connection = %handle.id(), "Connection closed");
}

/// Handle one decoded inbound frame.
async fn handle_frame(
    text: &str,
    identity: Option<UserId>,
    state: &Arc<AppState>,
    handle: &ClientHandle,
) {
    let event = match codec::decode_client(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(connection = %handle.id(), error = %e, "Undecodable frame");
            metrics::record_error("protocol");
            return;
        }
    };

    match event {
        ClientEvent::SendMessage {
            recipient,
            content,
            message_type,
        } => {
            // A connection admitted without identity has no send
            // capability; there is no response channel for this error.
            let Some(sender) = identity else {
                warn!(connection = %handle.id(), "Send on unauthenticated connection dropped");
                metrics::record_error("unauthenticated_send");
                return;
            };

            match state
                .pipeline
                .dispatch(sender, recipient, content, message_type)
                .await
            {
                Ok(receipt) => metrics::record_deliveries(receipt.deliveries),
                Err(e) => {
                    warn!(connection = %handle.id(), sender = %sender, error = %e, "Send failed");
                    metrics::record_error("dispatch");
                }
            }
        }

        ClientEvent::Ping { timestamp } => {
            let _ = handle.push(ServerEvent::pong(timestamp));
        }
    }
}
