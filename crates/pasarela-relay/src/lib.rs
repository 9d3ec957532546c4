//! Socket.IO relay client for the payment simulation.
//!
//! Connects to the relay, asserts a persisted session id, sends payloads
//! tagged with a delivery scope and fans inbound payloads out to any number
//! of observers.

pub mod errors;
pub mod identity;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod scope;
pub mod session;
pub mod transport;

pub use errors::{ConnectionError, ProtocolError, RelayError, TransportError};
pub use identity::{load_or_create, FileSessionStore, MemorySessionStore, SessionStore, SESSION_KEY};
pub use message::{
    amount_number, Channel, InboundMessage, PaymentCompleted, PaymentReceived, PaymentRejected, PaymentRequest,
    PaymentSent, RelayMessage,
};
pub use registry::{SubscriberId, SubscriberRegistry, Subscription};
pub use scope::{DeliveryScope, OutboundMessage};
pub use session::{ClientOptions, ConnectionState, RelayClient};
pub use transport::{Connector, Endpoint, FallbackConnector};
