//! Connector descriptors for plugs and sockets.
//!
//! Each filter core declares the connectors of its node. A plug connector
//! carries the pattern a remote socket must satisfy; a socket connector
//! carries the type registration it offers. Both may add a match predicate
//! for checks that a registration string cannot express.

use crate::pipeline::registration;
use std::fmt;
use std::sync::Arc;

/// Which end of an edge a connector describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorDirection {
    /// Output side, attached to a socket.
    Source,
    /// Input side, attached to a plug.
    Sink,
}

/// Capability predicate called as `(own, remote)`.
pub type MatchFn = Arc<dyn Fn(&Connector, &Connector) -> bool + Send + Sync>;

/// Why a link between two connectors was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRefusal {
    Type,
    Capability,
}

/// Typed attachment description. Immutable once attached to a node.
#[derive(Clone)]
pub struct Connector {
    pub name: String,
    pub direction: ConnectorDirection,
    /// For sources the offered type, for sinks the required pattern.
    pub registration: String,
    matcher: Option<MatchFn>,
}

impl Connector {
    pub fn source(name: impl Into<String>, registration: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: ConnectorDirection::Source,
            registration: registration.into(),
            matcher: None,
        }
    }

    pub fn sink(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: ConnectorDirection::Sink,
            registration: pattern.into(),
            matcher: None,
        }
    }

    pub fn with_match<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&Connector, &Connector) -> bool + Send + Sync + 'static,
    {
        self.matcher = Some(Arc::new(matcher));
        self
    }

    pub fn has_matcher(&self) -> bool {
        self.matcher.is_some()
    }

    /// Check whether `socket` may feed `plug`.
    ///
    /// The plug pattern is matched against the socket type first, then the
    /// predicates of both sides run, each seeing itself as the first argument.
    pub fn check_link(socket: &Connector, plug: &Connector) -> Result<(), LinkRefusal> {
        if !registration::matches(&plug.registration, &socket.registration) {
            return Err(LinkRefusal::Type);
        }
        if let Some(m) = &plug.matcher {
            if !m(plug, socket) {
                return Err(LinkRefusal::Capability);
            }
        }
        if let Some(m) = &socket.matcher {
            if !m(socket, plug) {
                return Err(LinkRefusal::Capability);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("registration", &self.registration)
            .field("matcher", &self.matcher.is_some())
            .finish()
    }
}
