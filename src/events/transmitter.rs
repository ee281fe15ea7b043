use super::{listener::notify, Event, EventIdentifier, EventListener};
use crate::{dispatch::DispatchHandler, model::ReceivedPayload};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{error, warn};

/// Handle returned on registration, used to remove a listener later.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ListenerId(u64);

#[derive(Clone)]
struct Registered {
    id: ListenerId,
    listener: Arc<dyn EventListener>,
}

/// Fans typed events out to registered listeners.
///
/// *Broad* listeners see every event. *Specified* listeners see only those
/// events whose identifier they registered for, including sub-events such as
/// [`EventIdentifier::GuildMessageCreate`], which broad listeners never
/// receive separately.
///
/// For each event, broad listeners are notified first, then specified
/// listeners for the event, then specified listeners for its sub-event. Each
/// group is notified in registration order.
#[derive(Default)]
pub struct EventTransmitter {
    next_id: AtomicU64,
    broad: RwLock<Vec<Registered>>,
    specified: DashMap<EventIdentifier, Vec<Registered>>,
}

impl fmt::Debug for EventTransmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTransmitter")
            .field("broad", &self.broad.read().len())
            .field("specified", &self.specified.len())
            .finish()
    }
}

impl EventTransmitter {
    /// Creates a transmitter with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, listener: Arc<dyn EventListener>) -> Registered {
        Registered {
            id: ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            listener,
        }
    }

    /// Registers a listener for every event.
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let reg = self.register(listener);
        let id = reg.id;
        self.broad.write().push(reg);

        id
    }

    /// Removes a broad listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut broad = self.broad.write();
        let before = broad.len();
        broad.retain(|r| r.id != id);

        broad.len() != before
    }

    /// Registers a listener for one kind of event only.
    pub fn add_specified_listener(
        &self,
        event: EventIdentifier,
        listener: Arc<dyn EventListener>,
    ) -> ListenerId {
        let reg = self.register(listener);
        let id = reg.id;
        self.specified.entry(event).or_default().push(reg);

        id
    }

    /// Removes a specified listener. Returns whether it was registered.
    pub fn remove_specified_listener(&self, id: ListenerId) -> bool {
        let mut removed = false;
        for mut entry in self.specified.iter_mut() {
            let list = entry.value_mut();
            let before = list.len();
            list.retain(|r| r.id != id);
            removed |= list.len() != before;
        }

        removed
    }

    /// Delivers `event` to every interested listener.
    pub fn fire(&self, event: &Event) {
        let broad: Vec<_> = self.broad.read().clone();
        let id = event.identifier();

        for reg in &broad {
            call(reg, id, event);
        }

        self.fire_specified(id, event);

        if let Some(sub) = event.sub_identifier() {
            self.fire_specified(sub, event);
        }
    }

    fn fire_specified(&self, id: EventIdentifier, event: &Event) {
        let listeners = match self.specified.get(&id) {
            Some(list) => list.clone(),
            None => return,
        };

        for reg in &listeners {
            call(reg, id, event);
        }
    }

    /// Decodes a dispatch payload and delivers the resulting event.
    ///
    /// Payloads which fail to decode are logged and dropped.
    pub fn on_payload(&self, payload: &ReceivedPayload) {
        match Event::from_payload(payload) {
            Ok(event) => self.fire(&event),
            Err(e) => warn!("Dropping {:?}: {}", payload.event_type(), e),
        }
    }
}

impl DispatchHandler for EventTransmitter {
    fn handle(&self, payload: &ReceivedPayload) {
        self.on_payload(payload);
    }
}

fn call(reg: &Registered, id: EventIdentifier, event: &Event) {
    let listener = &*reg.listener;
    if catch_unwind(AssertUnwindSafe(|| notify(listener, id, event))).is_err() {
        error!("Listener {:?} panicked while handling {}.", reg.id, id);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{event_name, GatewayPayload, Message};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl EventListener for Recorder {
        fn on_message_create(&self, _: &Message) {
            self.calls.lock().push(format!("{}:message", self.name));
        }

        fn on_guild_message_create(&self, _: &Message) {
            self.calls.lock().push(format!("{}:guild_message", self.name));
        }

        fn on_direct_message_create(&self, _: &Message) {
            self.calls.lock().push(format!("{}:direct_message", self.name));
        }

        fn on_unknown(&self, name: &str, _: &serde_json::Value) {
            self.calls.lock().push(format!("{}:{}", self.name, name));
        }
    }

    struct Panicker;

    impl EventListener for Panicker {
        fn on_message_create(&self, _: &Message) {
            panic!("listener failure");
        }
    }

    fn guild_message() -> ReceivedPayload {
        ReceivedPayload::new(GatewayPayload::dispatch(
            event_name::MESSAGE_CREATE,
            1,
            json!({
                "id": "1",
                "channel_id": "2",
                "guild_id": "3",
                "author": {"id": "4", "username": "a"},
            }),
        ))
    }

    fn recorder(name: &'static str, calls: &Arc<Mutex<Vec<String>>>) -> Arc<Recorder> {
        Arc::new(Recorder {
            name,
            calls: calls.clone(),
        })
    }

    #[test]
    fn broad_then_specified_then_sub_event() {
        let transmitter = EventTransmitter::new();
        let calls = Arc::default();

        transmitter.add_specified_listener(
            EventIdentifier::GuildMessageCreate,
            recorder("sub", &calls),
        );
        transmitter.add_specified_listener(
            EventIdentifier::DirectMessageCreate,
            recorder("dm", &calls),
        );
        transmitter.add_specified_listener(EventIdentifier::MessageCreate, recorder("named", &calls));
        transmitter.add_listener(recorder("broad", &calls));
        transmitter.add_specified_listener(EventIdentifier::Ready, recorder("ready", &calls));

        transmitter.on_payload(&guild_message());

        assert_eq!(
            *calls.lock(),
            vec!["broad:message", "named:message", "sub:guild_message"]
        );
    }

    #[test]
    fn removed_listeners_are_not_called() {
        let transmitter = EventTransmitter::new();
        let calls = Arc::default();

        let broad = transmitter.add_listener(recorder("broad", &calls));
        let named =
            transmitter.add_specified_listener(EventIdentifier::MessageCreate, recorder("named", &calls));

        assert!(transmitter.remove_listener(broad));
        assert!(!transmitter.remove_listener(broad));
        assert!(!transmitter.remove_listener(named));
        assert!(transmitter.remove_specified_listener(named));

        transmitter.on_payload(&guild_message());
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn panicking_listener_is_contained() {
        let transmitter = EventTransmitter::new();
        let calls = Arc::default();

        transmitter.add_listener(Arc::new(Panicker));
        transmitter.add_listener(recorder("after", &calls));
        transmitter.on_payload(&guild_message());

        assert_eq!(*calls.lock(), vec!["after:message"]);
    }

    #[test]
    fn undecodable_payloads_are_dropped() {
        let transmitter = EventTransmitter::new();
        let calls = Arc::default();
        transmitter.add_listener(recorder("broad", &calls));

        transmitter.on_payload(&ReceivedPayload::new(GatewayPayload::dispatch(
            event_name::MESSAGE_CREATE,
            1,
            json!({"id": "1"}),
        )));
        transmitter.on_payload(&ReceivedPayload::new(GatewayPayload::dispatch(
            "TYPING_START",
            2,
            json!({}),
        )));

        assert_eq!(*calls.lock(), vec!["broad:TYPING_START"]);
    }
}
