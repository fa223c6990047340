//! The LSP-facing half of tsbridge
//!
//! One [`session::Session`] per editor connection owns the document mirror,
//! the diagnostics scheduler, the configuration manager and the supervised
//! tsserver client. [`facade::Backend`] binds it to the tower-lsp endpoint
//! surface; the `features` modules hold the per-endpoint translation.

pub mod configuration;
pub mod convert;
pub mod diagnostics;
pub mod documents;
pub mod facade;
pub mod features;
pub mod line_index;
pub mod markdown;
pub mod session;

pub use facade::{Backend, BackendOptions};
pub use session::{Session, SessionOptions};
