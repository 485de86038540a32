//! Server-Sent Events stream of delivery events.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use futures::StreamExt;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::delivery::DeliveryEvent;
use crate::server::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// GET /api/v1/events
///
/// Opens with the current `state_changed` event, then relays every delivery
/// event until shutdown. Slow subscribers receive a `lagged` event with the
/// number skipped.
#[tracing::instrument(name = "sse.connect", skip(state))]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.events.subscribe();
    let mut stop = state.shutdown.subscribe();
    let initial = DeliveryEvent::StateChanged {
        state: state.orchestrator.state(),
    };

    tracing::info!(
        subscribers = state.events.subscriber_count(),
        "Event stream opened"
    );

    let stream = async_stream::stream! {
        yield Ok(to_sse(&initial));

        let mut events = BroadcastStream::new(receiver);
        loop {
            let next = tokio::select! {
                _ = stop.recv() => None,
                item = events.next() => item,
            };

            match next {
                None => break,
                Some(Ok(event)) => yield Ok(to_sse(&event)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped = skipped, "Event subscriber lagged");
                    yield Ok(Event::default().event("lagged").data(skipped.to_string()));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("heartbeat"),
    )
}

fn to_sse(event: &DeliveryEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().event(event.name()).data(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize delivery event");
            Event::default()
                .event("error")
                .data(format!(r#"{{"code":"SERIALIZATION_ERROR","message":"{}"}}"#, e))
        }
    }
}
