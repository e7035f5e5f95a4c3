mod handler;
mod message;
mod session;

pub use handler::{
    document_ws_handler, notification_ws_handler, subscribe_ws_handler, SubscribeQuery,
    WsFrameSource,
};
pub use message::{next_within, FrameSource, Inbound};
pub use session::{run_document_session, run_notification_session, subscription_reply};
