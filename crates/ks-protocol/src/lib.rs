//! ks-protocol: Wire protocol for the KubeSpace cluster agent
//!
//! This crate defines the JSON frames exchanged between the control server
//! and the agent over WebSocket connections: inbound [`Request`]s on the
//! control channel and outbound [`Response`]s on the response channel.

pub mod codec;
pub mod error;
pub mod message;
pub mod payload;
pub mod session;

pub use codec::{decode_request, encode_response, MAX_FRAME_SIZE};
pub use error::ProtocolError;
pub use message::{actions, CloseExecParams, Request, ResType, Response};
pub use payload::{Code, ResultPayload};
pub use session::RequestId;
