//! Observer links and signal delivery.
//!
//! A model keeps a list of observer links; every observer keeps the list of
//! models it watches, so either side can be cleaned up when it goes away.
//! Delivery is controlled by an explicit [`SignalContext`] that carries a
//! nestable disable depth and per-observer mutes.
//!
//! The default [`Handler::Forward`] re-emits the signal to the observer's own
//! observers. Forwarding walks breadth-first and visits every subject once,
//! so chains of any length are relayed without recursion.

use crate::pipeline::id::NodeId;
use crate::pipeline::options::OptionValue;
use crossbeam_channel::Sender;
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Anything that can emit or observe signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    Node(NodeId),
    /// Listener outside the graph (a conversion, a UI, a test harness).
    External(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// A node option changed. Data carries the new value.
    OptionChanged,
    /// A socket received new pixel data.
    DataReady,
    /// A plug was bound to a socket.
    Connected,
    /// A plug was unbound from a socket.
    Disconnected,
    /// The emitting object is being released.
    Released,
    User(u32),
}

impl Signal {
    /// Structural signals make downstream contexts stale.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Signal::OptionChanged | Signal::Connected | Signal::Disconnected | Signal::Released
        )
    }
}

pub type UserData = Arc<dyn Any + Send + Sync>;

/// One delivery of a signal to an observer.
#[derive(Clone)]
pub struct SignalEvent {
    /// Subject that emitted the signal first.
    pub origin: Subject,
    /// Subject whose observer list produced this delivery.
    pub sender: Subject,
    pub observer: Subject,
    pub signal: Signal,
    pub data: Option<OptionValue>,
    pub user_data: Option<UserData>,
}

impl fmt::Debug for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalEvent")
            .field("origin", &self.origin)
            .field("sender", &self.sender)
            .field("observer", &self.observer)
            .field("signal", &self.signal)
            .field("data", &self.data)
            .field("user_data", &self.user_data.is_some())
            .finish()
    }
}

/// Custom signal handler. Returns whether the event was handled.
pub trait SignalHandler: Send + Sync {
    fn handle(&self, event: &SignalEvent) -> bool;
}

impl<F> SignalHandler for F
where
    F: Fn(&SignalEvent) -> bool + Send + Sync,
{
    fn handle(&self, event: &SignalEvent) -> bool {
        self(event)
    }
}

#[derive(Clone)]
pub enum Handler {
    /// Re-emit to the observer's own observers.
    Forward,
    /// Push the event into a channel. A full or closed channel counts as unhandled.
    Channel(Sender<SignalEvent>),
    Custom(Arc<dyn SignalHandler>),
}

impl Handler {
    pub fn custom<H: SignalHandler + 'static>(handler: H) -> Self {
        Handler::Custom(Arc::new(handler))
    }

    fn same_as(&self, other: &Handler) -> bool {
        match (self, other) {
            (Handler::Forward, Handler::Forward) => true,
            (Handler::Channel(a), Handler::Channel(b)) => a.same_channel(b),
            (Handler::Custom(a), Handler::Custom(b)) => {
                Arc::as_ptr(a) as *const u8 == Arc::as_ptr(b) as *const u8
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Forward => write!(f, "Forward"),
            Handler::Channel(_) => write!(f, "Channel"),
            Handler::Custom(_) => write!(f, "Custom"),
        }
    }
}

#[derive(Clone)]
struct ObserverLink {
    observer: Subject,
    handler: Handler,
    user_data: Option<UserData>,
}

/// Delivery switches threaded through signal calls.
#[derive(Debug, Clone, Default)]
pub struct SignalContext {
    disabled: u32,
    muted: HashMap<Subject, u32>,
}

impl SignalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable all delivery. Calls nest; each needs a matching [`enable`](Self::enable).
    pub fn disable(&mut self) {
        self.disabled += 1;
    }

    pub fn enable(&mut self) {
        self.disabled = self.disabled.saturating_sub(1);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled > 0
    }

    /// Stop delivery to one observer. Nests like [`disable`](Self::disable).
    pub fn mute(&mut self, observer: Subject) {
        *self.muted.entry(observer).or_insert(0) += 1;
    }

    pub fn unmute(&mut self, observer: Subject) {
        if let Some(depth) = self.muted.get_mut(&observer) {
            *depth -= 1;
            if *depth == 0 {
                self.muted.remove(&observer);
            }
        }
    }

    pub fn is_muted(&self, observer: Subject) -> bool {
        self.muted.contains_key(&observer)
    }

    /// Run `f` with delivery disabled.
    pub fn suppressed<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.disable();
        let out = f(self);
        self.enable();
        out
    }
}

#[derive(Default)]
pub struct SignalBus {
    observers: HashMap<Subject, Vec<ObserverLink>>,
    models: HashMap<Subject, Vec<Subject>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `observer` to `model`. Returns `false` if the same observer/handler
    /// pair is already registered.
    pub fn subscribe(
        &mut self,
        model: Subject,
        observer: Subject,
        user_data: Option<UserData>,
        handler: Handler,
    ) -> bool {
        let links = self.observers.entry(model).or_default();
        if links
            .iter()
            .any(|l| l.observer == observer && l.handler.same_as(&handler))
        {
            return false;
        }
        links.push(ObserverLink {
            observer,
            handler,
            user_data,
        });
        let watched = self.models.entry(observer).or_default();
        if !watched.contains(&model) {
            watched.push(model);
        }
        true
    }

    /// Remove links from `model` to `observer`; all handlers when `handler` is `None`.
    pub fn unsubscribe(
        &mut self,
        model: Subject,
        observer: Subject,
        handler: Option<&Handler>,
    ) -> usize {
        let mut removed = 0;
        let mut still_linked = false;
        if let Some(links) = self.observers.get_mut(&model) {
            let before = links.len();
            links.retain(|l| {
                l.observer != observer || handler.is_some_and(|h| !l.handler.same_as(h))
            });
            removed = before - links.len();
            still_linked = links.iter().any(|l| l.observer == observer);
            if links.is_empty() {
                self.observers.remove(&model);
            }
        }
        if !still_linked {
            if let Some(watched) = self.models.get_mut(&observer) {
                watched.retain(|m| *m != model);
                if watched.is_empty() {
                    self.models.remove(&observer);
                }
            }
        }
        removed
    }

    /// Drop every link that involves `subject`, on either side.
    pub fn remove_subject(&mut self, subject: Subject) {
        if let Some(links) = self.observers.remove(&subject) {
            for link in links {
                if let Some(watched) = self.models.get_mut(&link.observer) {
                    watched.retain(|m| *m != subject);
                    if watched.is_empty() {
                        self.models.remove(&link.observer);
                    }
                }
            }
        }
        if let Some(models) = self.models.remove(&subject) {
            for model in models {
                if let Some(links) = self.observers.get_mut(&model) {
                    links.retain(|l| l.observer != subject);
                    if links.is_empty() {
                        self.observers.remove(&model);
                    }
                }
            }
        }
    }

    pub fn observers_of(&self, model: Subject) -> Vec<Subject> {
        self.observers
            .get(&model)
            .map(|links| links.iter().map(|l| l.observer).collect())
            .unwrap_or_default()
    }

    pub fn models_of(&self, observer: Subject) -> Vec<Subject> {
        self.models.get(&observer).cloned().unwrap_or_default()
    }

    pub fn is_linked(&self, model: Subject, observer: Subject) -> bool {
        self.observers
            .get(&model)
            .is_some_and(|links| links.iter().any(|l| l.observer == observer))
    }

    /// Deliver `signal` from `model`. Returns the number of handled deliveries.
    pub fn signal(
        &self,
        ctx: &SignalContext,
        model: Subject,
        signal: Signal,
        data: Option<OptionValue>,
    ) -> usize {
        if ctx.is_disabled() {
            return 0;
        }
        let mut handled = 0;
        let mut queue = VecDeque::from([model]);
        let mut visited = HashSet::from([model]);
        while let Some(sender) = queue.pop_front() {
            let Some(links) = self.observers.get(&sender) else {
                continue;
            };
            for link in links {
                if ctx.is_muted(link.observer) {
                    continue;
                }
                let ok = match &link.handler {
                    Handler::Forward => {
                        if visited.insert(link.observer) {
                            queue.push_back(link.observer);
                        }
                        true
                    }
                    Handler::Channel(tx) => tx.try_send(self.event(model, sender, link, signal, &data)).is_ok(),
                    Handler::Custom(h) => h.handle(&self.event(model, sender, link, signal, &data)),
                };
                if ok {
                    handled += 1;
                }
            }
        }
        tracing::trace!("Signal {:?} from {:?} handled {} time(s)", signal, model, handled);
        handled
    }

    fn event(
        &self,
        origin: Subject,
        sender: Subject,
        link: &ObserverLink,
        signal: Signal,
        data: &Option<OptionValue>,
    ) -> SignalEvent {
        SignalEvent {
            origin,
            sender,
            observer: link.observer,
            signal,
            data: data.clone(),
            user_data: link.user_data.clone(),
        }
    }
}
