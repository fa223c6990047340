//! tsserver wire protocol for tsbridge
//!
//! This crate owns everything that crosses the boundary to the TypeScript
//! analysis process: the tagged message model (`request`/`response`/`event`),
//! the two interchangeable framings (length-prefixed stdio and discrete
//! node-IPC messages), the typed command table pairing request arguments
//! with response bodies, the resolved server version with its feature
//! gates, and the reversible URI ↔ server-path mapping.
//!
//! Nothing in here talks to a process or an editor; the types are pure data
//! and the codecs are state machines over byte buffers.

pub mod codec;
pub mod command;
pub mod error;
pub mod filepath;
pub mod message;
pub mod types;
pub mod version;

pub use codec::{NodeIpcCodec, StdioCodec};
pub use command::CommandSpec;
pub use error::ProtocolError;
pub use message::{Event, Message, Request, Response};
pub use version::ApiVersion;
