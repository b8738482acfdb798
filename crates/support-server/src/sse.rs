//! Server-Sent Events transport
//!
//! Each streaming request runs in its own task that writes [`StreamEvent`]s
//! into a bounded channel; the SSE response body drains the other end.
//! Dropping the body (client gone) closes the channel, which cancels the
//! request's token and aborts any in-flight model call.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use agent_core::StreamEvent;

const CHANNEL_CAPACITY: usize = 32;

/// Encode one relay event as an SSE frame
pub fn to_event(event: &StreamEvent) -> Event {
    Event::default().event(event.name()).data(event.data().to_string())
}

/// Run `producer` in a background task and stream what it emits
pub fn spawn_stream<F, Fut>(producer: F) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: FnOnce(mpsc::Sender<StreamEvent>, CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    let watched = tx.clone();
    let watcher_token = cancel.clone();
    tokio::spawn(
        async move {
            tokio::select! {
                () = watched.closed() => {
                    tracing::debug!("SSE client disconnected");
                    watcher_token.cancel();
                }
                () = watcher_token.cancelled() => {}
            }
        }
        .in_current_span(),
    );

    tokio::spawn(
        async move {
            // Ends the watcher once the producer is finished
            let _finished = cancel.clone().drop_guard();
            producer(tx, cancel).await;
        }
        .in_current_span(),
    );

    let events = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(to_event(&event)));
    Sse::new(events).keep_alive(KeepAlive::default())
}
