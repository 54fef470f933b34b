//! Connections to the control server

mod connector;
mod reconnect;
mod transport;

pub use connector::{close_quietly, send_text, Connector, TransportError, WsStream, TOKEN_HEADER};
pub use reconnect::FixedInterval;
pub use transport::{ConnectHook, Transport};
