use marquee_shared::OrderEvent;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Fan-out of order lifecycle events to in-process subscribers.
///
/// Publishing never blocks: with no subscribers the event is only logged,
/// slow subscribers skip what they missed.
#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<OrderEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: OrderEvent) {
        let name = event.name();
        let order_id = event.order_id();
        match self.sender.send(event) {
            Ok(receivers) => {
                info!(event = name, order_id = ?order_id, receivers, "Order event published");
            }
            Err(_) => {
                debug!(event = name, order_id = ?order_id, "Order event published with no subscribers");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}
