//! Tokio broadcast event bus for consumption notifications.

use super::ConsumptionObserver;
use crate::models::{ConsumptionEvent, Document, EventMeta};
use std::path::Path;
use tokio::sync::broadcast;

const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;
const EVENT_SOURCE: &str = "consumer";

/// Central event bus for broadcasting consumption events.
///
/// Publishing never blocks the pipeline: events sent with no subscriber are
/// dropped, and slow subscribers lag instead of applying back-pressure.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ConsumptionEvent>,
}

/// Filtered receiver that yields events matching a predicate.
pub struct FilteredReceiver<F> {
    receiver: broadcast::Receiver<ConsumptionEvent>,
    predicate: F,
}

impl EventBus {
    /// Creates a new event bus with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers (best effort).
    pub fn publish(&self, event: ConsumptionEvent) {
        metrics::counter!("event_bus_publish_total", "event_type" => event.event_type())
            .increment(1);
        if self.sender.send(event).is_err() {
            metrics::counter!("event_bus_publish_failed_total").increment(1);
        }
    }

    /// Subscribes to the event bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConsumptionEvent> {
        metrics::counter!("event_bus_subscriptions_total").increment(1);
        self.sender.subscribe()
    }

    /// Subscribes with a predicate to filter events.
    #[must_use]
    pub fn subscribe_filtered<F>(&self, predicate: F) -> FilteredReceiver<F>
    where
        F: Fn(&ConsumptionEvent) -> bool,
    {
        FilteredReceiver {
            receiver: self.subscribe(),
            predicate,
        }
    }

    /// Subscribes to events of one type (`consumption.finished`, ...).
    #[must_use]
    pub fn subscribe_event_type(
        &self,
        event_type: &'static str,
    ) -> FilteredReceiver<impl Fn(&ConsumptionEvent) -> bool> {
        self.subscribe_filtered(move |event| event.event_type() == event_type)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

impl ConsumptionObserver for EventBus {
    fn on_consumption_started(&self, path: &Path, correlation_id: &str) {
        self.publish(ConsumptionEvent::Started {
            meta: EventMeta::new(EVENT_SOURCE, Some(correlation_id.to_string())),
            path: path.to_path_buf(),
        });
    }

    fn on_consumption_finished(&self, document: &Document, correlation_id: &str) {
        self.publish(ConsumptionEvent::Finished {
            meta: EventMeta::new(EVENT_SOURCE, Some(correlation_id.to_string())),
            document_id: document.id,
            checksum: document.checksum.clone(),
            title: document.title.clone(),
        });
    }

    fn on_consumption_failed(&self, path: &Path, reason: &'static str, correlation_id: &str) {
        self.publish(ConsumptionEvent::Failed {
            meta: EventMeta::new(EVENT_SOURCE, Some(correlation_id.to_string())),
            path: path.to_path_buf(),
            reason,
        });
    }
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&ConsumptionEvent) -> bool,
{
    /// Receives the next event that matches the predicate.
    ///
    /// # Errors
    ///
    /// Returns [`broadcast::error::RecvError::Closed`] once every sender is gone.
    pub async fn recv(&mut self) -> Result<ConsumptionEvent, broadcast::error::RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if (self.predicate)(&event) => return Ok(event),
                Ok(_) => {},
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    metrics::counter!("event_bus_lagged_total").increment(skipped);
                },
                Err(err) => return Err(err),
            }
        }
    }
}
