pub mod live;

// Re-export commonly used types for convenience
pub use live::{
    AudioEgressChannel, ConnectionState, LiveError, LiveEvent, LiveEventHandler, LiveResult,
    LiveSession, ReconnectSupervisor, SessionOptions, SetupCommand, ToolResponseChannel, TurnPair,
    WebSocketConnector,
};
