//! Handler dispatch shared by the bus implementations.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{Delivery, MessageHandler};

/// Registered handlers of one bus.
pub(crate) type Handlers = Arc<RwLock<Vec<Arc<dyn MessageHandler>>>>;

/// Dispatch a delivery to all registered handlers, in registration order.
///
/// Returns once every handler has finished, which is the point at which the
/// caller may acknowledge the message.
pub(crate) async fn dispatch_to_handlers(handlers: &Handlers, delivery: Delivery) {
    let handlers_guard = handlers.read().await;

    if handlers_guard.is_empty() {
        warn!(
            topic = %delivery.topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "No handlers registered, message dropped"
        );
        return;
    }

    debug!(
        topic = %delivery.topic,
        partition = delivery.partition,
        offset = delivery.offset,
        handlers = handlers_guard.len(),
        "Dispatching delivery"
    );

    for handler in handlers_guard.iter() {
        handler.handle(delivery.clone()).await;
    }
}
