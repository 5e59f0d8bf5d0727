//! Relay message kinds.
//!
//! Kinds travel as strings:
//!
//! | kind | payload |
//! |---|---|
//! | `doc` | an update |
//! | `state-vector-request` | the sender's state vector |
//! | `state-vector-response:<peer id>` | a diff for the addressed peer |

use crate::presence::PeerId;
use listed_core::{StateVector, Update};
use std::fmt;

/// Storage key and message kind of the document itself.
pub const DOC_KEY: &str = "doc";

/// Message kind of a catch-up request.
pub const STATE_VECTOR_REQUEST: &str = "state-vector-request";

/// Prefix of an addressed catch-up response.
pub const STATE_VECTOR_RESPONSE_PREFIX: &str = "state-vector-response:";

/// The kind of a relay message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A document update.
    Doc,
    /// A reconnecting peer asking for what it missed.
    StateVectorRequest,
    /// The janitor's diff, addressed to one peer.
    StateVectorResponse(PeerId),
    /// Anything this replica does not understand.
    Other(String),
}

impl MessageKind {
    /// Parses a wire kind. Unknown or malformed kinds become [`MessageKind::Other`].
    pub fn parse(kind: &str) -> Self {
        match kind {
            DOC_KEY => MessageKind::Doc,
            STATE_VECTOR_REQUEST => MessageKind::StateVectorRequest,
            _ => kind
                .strip_prefix(STATE_VECTOR_RESPONSE_PREFIX)
                .and_then(|target| target.parse::<PeerId>().ok())
                .map(MessageKind::StateVectorResponse)
                .unwrap_or_else(|| MessageKind::Other(kind.to_string())),
        }
    }

    /// Returns the wire form.
    pub fn as_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Doc => f.write_str(DOC_KEY),
            MessageKind::StateVectorRequest => f.write_str(STATE_VECTOR_REQUEST),
            MessageKind::StateVectorResponse(target) => {
                write!(f, "{STATE_VECTOR_RESPONSE_PREFIX}{target}")
            }
            MessageKind::Other(kind) => f.write_str(kind),
        }
    }
}

impl From<&str> for MessageKind {
    fn from(kind: &str) -> Self {
        MessageKind::parse(kind)
    }
}

/// A message exchanged through the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    /// Message kind.
    pub kind: MessageKind,
    /// Opaque payload.
    pub payload: Vec<u8>,
    /// Sending peer, when the sender identifies itself.
    pub origin: Option<PeerId>,
}

impl RemoteMessage {
    /// Creates a message.
    pub fn new(kind: MessageKind, payload: Vec<u8>, origin: Option<PeerId>) -> Self {
        Self {
            kind,
            payload,
            origin,
        }
    }

    /// Creates a document update message.
    pub fn doc(update: Update) -> Self {
        Self::new(MessageKind::Doc, update, None)
    }

    /// Creates a catch-up request from `origin`.
    pub fn state_vector_request(vector: StateVector, origin: PeerId) -> Self {
        Self::new(MessageKind::StateVectorRequest, vector, Some(origin))
    }

    /// Creates a catch-up response addressed to `target`.
    pub fn state_vector_response(target: PeerId, diff: Update) -> Self {
        Self::new(MessageKind::StateVectorResponse(target), diff, None)
    }
}
