//! Server-Sent Events support

use crate::runtime::TurnEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Stream a turn's events to the client. Dropping the response drops the
/// receiver, which cancels the turn.
pub fn turn_stream(
    rx: mpsc::Receiver<TurnEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = ReceiverStream::new(rx).map(|event| Ok(turn_event_to_axum(&event)));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn turn_event_to_axum(event: &TurnEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|e| {
        json!({ "type": "error", "message": format!("Failed to encode event: {e}") }).to_string()
    });
    if event.is_terminal() {
        tracing::debug!(event = event.event_name(), "Turn stream finished");
    }
    Event::default().event(event.event_name()).data(data)
}
