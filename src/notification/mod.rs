//! Notification events and their subscription-scoped dispatch.

mod dispatcher;
mod types;

pub use dispatcher::{DispatcherStats, DispatcherStatsSnapshot, NotificationDispatcher};
pub use types::{
    EventParseError, NotificationEvent, CONNECTED, ERROR, SUBSCRIBED, USER_JOINED, USER_LEFT,
};
