//! Transport implementations and the request/response runtime built on top
//! of them. `conduit-core` defines what a message is; this crate defines
//! how messages move between peers and how outbound requests get matched
//! back to their responses.

pub mod core;
pub mod http_sse;
pub mod in_memory;
pub mod runtime;
pub mod stdio;

pub use crate::core::{
    Transport, TransportCapabilities, TransportError, TransportResult, TransportState, TransportType,
};
pub use http_sse::{HttpSseAcceptor, HttpSseConfig, HttpSseTransport};
pub use in_memory::InMemoryTransport;
pub use runtime::{Demux, RpcRuntime};
pub use stdio::StdioTransport;
