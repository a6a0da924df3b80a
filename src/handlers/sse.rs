use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use serde::{de::DeserializeOwned, Serialize};
use std::convert::Infallible;
use tracing::warn;

use crate::store::LiveCollection;

const SNAPSHOT_EVENT: &str = "snapshot";

/// Streams the current list, then the full list again after every change.
pub(crate) fn snapshot_stream<T>(
    live: LiveCollection<T>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    let initial = live.current();
    let events = stream::unfold((live, Some(initial)), |(mut live, pending)| async move {
        let records = match pending {
            Some(records) => records,
            None => live.changed().await?,
        };
        let event = Event::default()
            .event(SNAPSHOT_EVENT)
            .json_data(&records)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to encode live snapshot");
                Event::default().comment("snapshot encoding failed")
            });
        Some((Ok(event), (live, None)))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}
