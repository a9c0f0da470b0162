//! Link events and the subscriber bus

use std::net::SocketAddr;

use datalink_wire::Hello;

/// Something observable happened on the link
#[derive(Clone, Debug, PartialEq)]
pub enum LinkEvent {
    Listening { addr: SocketAddr },
    Connecting { addr: SocketAddr },
    Accepted { addr: SocketAddr },
    /// Handshake complete
    Connected { remote: Hello },
    ConnectionLost { reason: String },
    ServerStopped,
    ClientStopped,
    Received { opcode: u32, len: usize },
    Sent { opcode: u32, len: usize },
    /// Connection state changed
    Changed,
    /// Human readable status line
    Status(String),
}

/// Event discriminant used for subscriptions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Listening,
    Connecting,
    Accepted,
    Connected,
    ConnectionLost,
    ServerStopped,
    ClientStopped,
    Received,
    Sent,
    Changed,
    Status,
}

impl LinkEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LinkEvent::Listening { .. } => EventKind::Listening,
            LinkEvent::Connecting { .. } => EventKind::Connecting,
            LinkEvent::Accepted { .. } => EventKind::Accepted,
            LinkEvent::Connected { .. } => EventKind::Connected,
            LinkEvent::ConnectionLost { .. } => EventKind::ConnectionLost,
            LinkEvent::ServerStopped => EventKind::ServerStopped,
            LinkEvent::ClientStopped => EventKind::ClientStopped,
            LinkEvent::Received { .. } => EventKind::Received,
            LinkEvent::Sent { .. } => EventKind::Sent,
            LinkEvent::Changed => EventKind::Changed,
            LinkEvent::Status(_) => EventKind::Status,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&LinkEvent)>;

struct Subscriber {
    id: SubscriptionId,
    /// None receives every event
    kind: Option<EventKind>,
    callback: Callback,
}

/// Synchronous event fan-out.
///
/// Callbacks run on the emitting thread in subscription order.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one event kind
    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: FnMut(&LinkEvent) + 'static,
    {
        self.push(Some(kind), Box::new(callback))
    }

    /// Register a callback for every event
    pub fn subscribe_all<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&LinkEvent) + 'static,
    {
        self.push(None, Box::new(callback))
    }

    fn push(&mut self, kind: Option<EventKind>, callback: Callback) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push(Subscriber { id, kind, callback });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn emit(&mut self, event: &LinkEvent) {
        let kind = event.kind();
        for sub in &mut self.subscribers {
            if sub.kind.map_or(true, |k| k == kind) {
                (sub.callback)(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
