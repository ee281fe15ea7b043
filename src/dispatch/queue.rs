use crate::model::ReceivedPayload;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Ordered buffer of dispatch payloads awaiting a processor.
///
/// Filled by the gateway runner, and drained by whichever
/// [`EventProcessor`] is in use.
///
/// [`EventProcessor`]: super::EventProcessor
#[derive(Debug, Default)]
pub struct DispatchEventQueue {
    items: Mutex<VecDeque<ReceivedPayload>>,
}

impl DispatchEventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a payload to the back of the queue.
    pub fn push(&self, payload: ReceivedPayload) {
        self.items.lock().push_back(payload);
    }

    /// Removes the oldest payload, if any.
    pub fn pull(&self) -> Option<ReceivedPayload> {
        self.items.lock().pop_front()
    }

    /// Returns a copy of the oldest payload without removing it.
    pub fn peek(&self) -> Option<ReceivedPayload> {
        self.items.lock().front().cloned()
    }

    /// Number of payloads currently buffered.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether no payloads are buffered.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::GatewayPayload;
    use serde_json::json;

    #[test]
    fn payloads_leave_in_arrival_order() {
        let queue = DispatchEventQueue::new();
        for seq in 1..=3 {
            queue.push(ReceivedPayload::new(GatewayPayload::dispatch(
                "MESSAGE_CREATE",
                seq,
                json!({ "guild_id": "9" }),
            )));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.peek().and_then(|p| p.payload().sequence()), Some(1));

        let seqs: Vec<_> = std::iter::from_fn(|| queue.pull())
            .filter_map(|p| p.payload().sequence())
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }
}
