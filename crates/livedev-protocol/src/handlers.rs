//! Event handler lookup table.

use livedev_core::{ClientId, Method};
use serde_json::Value;
use std::collections::HashMap;

/// An inbound event, with the client it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub method: Method,
    pub client: ClientId,
    pub params: Value,
}

/// Callback run on the dispatcher task; must not block.
pub type Handler = Box<dyn Fn(&Event) + Send + 'static>;

#[derive(Default)]
pub(crate) struct HandlerTable {
    handlers: HashMap<Method, Vec<Handler>>,
}

impl HandlerTable {
    pub(crate) fn register(&mut self, method: Method, handler: Handler) {
        self.handlers.entry(method).or_default().push(handler);
    }

    /// Run every handler for the event's method. Returns how many ran.
    pub(crate) fn dispatch(&self, event: &Event) -> usize {
        let Some(handlers) = self.handlers.get(&event.method) else {
            return 0;
        };
        for handler in handlers {
            handler(event);
        }
        handlers.len()
    }
}
