//! Live event stream over WebSocket.
//!
//! On connect the client receives a `status` greeting and the `history`
//! snapshot, then every scanner event as it happens.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::routes::AppState;
use crate::events::ScanEvent;

pub async fn ws_handler(ws: WebSocketUpgrade, State(scanner): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, scanner))
}

async fn handle_socket(socket: WebSocket, scanner: AppState) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before the snapshot so nothing falls between the two.
    let mut events = scanner.subscribe();
    debug!("Subscriber connected");

    let greeting = [
        ScanEvent::Status {
            message: "Connected to DealScope".into(),
        },
        ScanEvent::History(scanner.history().await),
    ];
    for event in &greeting {
        if send_event(&mut sender, event).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Subscriber disconnected");
}

async fn send_event<S>(sender: &mut S, event: &ScanEvent) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let Ok(text) = serde_json::to_string(event) else {
        warn!(?event, "Failed to serialise event");
        return Ok(());
    };
    sender.send(Message::Text(text)).await.map_err(|_| ())
}
