//! Registry of live connections, document editors and notification interests.

mod registry;
mod stats;
mod types;

pub(crate) use registry::fan_out;
pub use registry::{ConnectionRegistry, DeliveryResult};
pub use stats::{ConnectionStats, DocumentPresence};
pub use types::{
    ConnectionHandle, ConnectionId, ConnectionKind, DocumentId, OutboundFrame, SendFailure,
};
