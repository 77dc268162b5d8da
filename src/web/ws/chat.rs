//! Chat WebSocket gateway.
//!
//! Resolves the requested room or peer before upgrading, then runs one task
//! per connection that pumps inbound frames into the router and drains the
//! session's outbound queue onto the socket.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::{HeaderMap, HeaderName},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::chat::{
    Channel, ChatRouter, GroupEvent, ServerFrame, Session, SessionId, UserIdentity,
};
use crate::web::error::ApiError;
use crate::{RelayError, Result};

/// State for the chat WebSocket handlers.
#[derive(Clone)]
pub struct ChatWsState {
    /// Chat router.
    pub router: Arc<ChatRouter>,
    /// Trusted header carrying the authenticated username.
    pub user_header: HeaderName,
}

impl ChatWsState {
    /// Create a new chat WebSocket state.
    pub fn new(router: Arc<ChatRouter>, user_header: &str) -> Result<Self> {
        let user_header = HeaderName::try_from(user_header.to_ascii_lowercase())
            .map_err(|e| RelayError::Config(format!("invalid user header '{user_header}': {e}")))?;
        Ok(Self {
            router,
            user_header,
        })
    }

    /// Resolve the requester from the trusted identity header.
    async fn requester(
        &self,
        headers: &HeaderMap,
    ) -> std::result::Result<Option<UserIdentity>, ApiError> {
        let username = headers
            .get(&self.user_header)
            .and_then(|value| value.to_str().ok());
        Ok(self.router.identify(username).await?)
    }
}

/// Whether a path segment is a non-empty run of word characters.
pub fn is_valid_path_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_path_token(token: &str) -> std::result::Result<(), ApiError> {
    if is_valid_path_token(token) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("invalid path segment '{token}'")))
    }
}

/// Room chat WebSocket handler.
///
/// GET /ws/chat/{room_name}/
pub async fn room_ws_handler(
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<ChatWsState>>,
    Path(room_name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let accepted = async {
        check_path_token(&room_name)?;
        let identity = state.requester(&headers).await?;
        let name = state.router.resolve_room(&room_name).await?;
        Ok::<_, ApiError>((identity, Channel::Room { name }))
    }
    .await;

    match accepted {
        Ok((identity, channel)) => upgrade(ws, state, identity, channel),
        Err(e) => {
            tracing::debug!("Room connection to '{}' rejected: {}", room_name, e);
            e.into_response()
        }
    }
}

/// Direct message WebSocket handler.
///
/// GET /ws/direct_messages/{receiver}/
pub async fn direct_ws_handler(
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<ChatWsState>>,
    Path(receiver): Path<String>,
    headers: HeaderMap,
) -> Response {
    let accepted = async {
        check_path_token(&receiver)?;
        let identity = state
            .requester(&headers)
            .await?
            .ok_or_else(|| ApiError::unauthorized("direct messages require login"))?;
        let peer = state
            .router
            .resolve_peer(Some(&identity), &receiver)
            .await?;
        Ok::<_, ApiError>((Some(identity), Channel::Direct { peer }))
    }
    .await;

    match accepted {
        Ok((identity, channel)) => upgrade(ws, state, identity, channel),
        Err(e) => {
            tracing::debug!("Direct connection to '{}' rejected: {}", receiver, e);
            e.into_response()
        }
    }
}

fn upgrade(
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    state: Arc<ChatWsState>,
    identity: Option<UserIdentity>,
    channel: Channel,
) -> Response {
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state, identity, channel)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Handle an upgraded WebSocket connection.
///
/// The session runs in its own task so that cleanup happens even if the task
/// panics.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<ChatWsState>,
    identity: Option<UserIdentity>,
    channel: Channel,
) {
    let router = Arc::clone(&state.router);
    let (session, events) = router.open_session(identity, channel);
    let session_id = session.id();

    let task = tokio::spawn(run_session(socket, Arc::clone(&router), session, events));
    match task.await {
        Ok(mut session) => router.close(&mut session).await,
        Err(e) => {
            tracing::error!(session = %session_id, error = %e, "session task failed");
            let removed = router.registry().leave_all(session_id).await;
            tracing::info!(session = %session_id, groups = removed, "session cleaned up");
        }
    }
}

/// Attach a session and pump frames until either side goes away.
///
/// Returns the session so the caller can detach it.
async fn run_session(
    socket: WebSocket,
    router: Arc<ChatRouter>,
    mut session: Session,
    mut events: mpsc::Receiver<Arc<GroupEvent>>,
) -> Session {
    let session_id = session.id();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    match router.connect(&mut session).await {
        Ok(snapshot) => {
            if !send_frame(&mut ws_sender, session_id, &snapshot).await {
                return session;
            }
        }
        Err(e) => {
            tracing::warn!(session = %session_id, error = %e, "failed to attach session");
            let _ = ws_sender.send(Message::Close(None)).await;
            return session;
        }
    }

    loop {
        tokio::select! {
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = router.handle_text(&session, &text).await {
                            log_frame_error(session_id, &e);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if ws_sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(session = %session_id, "WebSocket closed by client");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(session = %session_id, "WebSocket error: {}", e);
                        break;
                    }
                }
            }

            event = events.recv() => {
                let Some(event) = event else { break };
                if session.accepts(&event) {
                    let frame = session.render(&event, Utc::now(), router.timezone());
                    if !send_frame(&mut ws_sender, session_id, &frame).await {
                        break;
                    }
                }
            }
        }
    }

    session
}

/// Send a frame. Returns false if the socket is gone.
async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    session_id: SessionId,
    frame: &ServerFrame,
) -> bool {
    match frame.to_json() {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::warn!(session = %session_id, error = %e, "failed to encode frame");
            true
        }
    }
}

fn log_frame_error(session_id: SessionId, error: &RelayError) {
    match error {
        RelayError::Database(_) | RelayError::Io(_) => {
            tracing::error!(session = %session_id, error = %error, "inbound frame failed");
        }
        RelayError::Permission(_) => {
            tracing::warn!(session = %session_id, error = %error, "inbound frame refused");
        }
        _ => {
            tracing::debug!(session = %session_id, error = %error, "inbound frame dropped");
        }
    }
}
