use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{
    AppError, AppResult, AppState, config::Config, coordinator::Coordinator, error::EngineError,
    protocol::ClientEvent,
};

#[debug_handler(state = AppState)]
pub(crate) async fn chat_ws(
    State(coordinator): State<Coordinator>,
    State(config): State<Arc<Config>>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    if !coordinator.accepting() {
        return Err(AppError::from(EngineError::ServerFull).with_status(StatusCode::SERVICE_UNAVAILABLE));
    }

    Ok(ws
        .max_message_size(config.max_frame_bytes())
        .on_upgrade(move |stream| serve(coordinator, config.outbound_buffer, stream))
        .into_response())
}

async fn serve(coordinator: Coordinator, buffer: usize, stream: WebSocket) {
    let (mut sender, mut receiver) = stream.split();
    let (tx, mut rx) = mpsc::channel(buffer.max(1));

    let handle = match coordinator.connect(tx) {
        Ok(handle) => handle,
        Err(err) => {
            warn!("refusing connection: {err}");
            if let Ok(frame) = serde_json::to_string(&err.to_event()) {
                let _ = sender.send(Message::Text(frame.into())).await;
            }
            let _ = sender.close().await;
            return;
        }
    };
    info!(%handle, "connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(err) => {
                    error!("couldn't encode outbound event: {err}");
                    continue;
                }
            };
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let recv = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => coordinator.handle(handle, event),
                    Err(err) => coordinator.reject(handle, err.into()),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = recv => {},
        _ = &mut send_task => {},
    };

    coordinator.disconnect(handle);
    send_task.abort();
    info!(%handle, "disconnected");
}
