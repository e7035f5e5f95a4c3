mod settings;

pub use settings::{
    HubConfig, LoggingConfig, RuntimeConfig, RuntimeFlavor, ServerConfig, Settings,
    ShutdownSettings, WebSocketConfig,
};

pub use crate::ratelimit::RateLimitConfig;
