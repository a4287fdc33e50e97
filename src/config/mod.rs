mod settings;

pub use settings::{
    ClientConfig, LogFormat, LoggingConfig, ServerConfig, Settings, WebSocketConfig,
};
