//! tsserver lifecycle management for tsbridge
//!
//! Everything between the protocol types and the LSP-facing session:
//! finding a tsserver (`resolver`), forking and supervising it
//! (`process`, `supervisor`), sequencing requests and correlating
//! completions (`queue`, `client`), cancellation (`cancellation`), and
//! routing between the semantic server and the optional syntax sidecar
//! (`router`).

pub mod cancellation;
pub mod client;
pub mod error;
pub mod outcome;
pub mod process;
pub mod queue;
pub mod resolver;
pub mod router;
pub mod supervisor;

pub use client::{RequestOptions, ServerEvent, ServerHandle};
pub use error::{Result, TsServerError};
pub use outcome::ResponseOutcome;
pub use process::{LogVerbosity, ServerKind};
pub use resolver::{ResolutionSource, TsServerResolution, VersionResolver};
pub use router::ExecutionTarget;
pub use supervisor::{LaunchConfig, LifecycleNotice, TsClient};
