//! Routing commands between the semantic and syntax servers
//!
//! With a single server everything goes to it. With the syntax sidecar
//! running, each command is routed by a static classification, except that
//! a handful of interactive commands prefer the syntax server while the
//! semantic server is still loading a project.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tsbridge_protocol::command::names;

use crate::process::ServerKind;

/// Caller-requested routing override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionTarget {
    Syntax,
    Semantic,
}

/// Where a command should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Syntax,
    Semantic,
    /// Buffer-state commands every server needs to observe.
    Both,
}

/// Commands the syntax server alone answers.
const SYNTAX_ONLY: &[&str] = &[
    names::NAV_TREE,
    names::GET_OUTLINING_SPANS,
    names::JSX_CLOSING_TAG,
    names::SELECTION_RANGE,
    names::FORMAT,
    names::FORMATONKEY,
    names::DOC_COMMENT_TEMPLATE,
];

/// Commands only the project-aware server can answer.
const SEMANTIC_ONLY: &[&str] = &[
    names::GETERR,
    names::GETERR_FOR_PROJECT,
    names::PROJECT_INFO,
    names::CONFIGURE_PLUGIN,
];

/// Commands that fall back to the syntax server while the semantic one is
/// still loading, trading accuracy for latency.
const SYNTAX_PREFERRED_WHILE_LOADING: &[&str] = &[
    names::COMPLETION_INFO,
    names::COMPLETION_ENTRY_DETAILS,
    names::DEFINITION,
    names::DEFINITION_AND_BOUND_SPAN,
    names::DOCUMENT_HIGHLIGHTS,
    names::IMPLEMENTATION,
    names::NAVTO,
    names::QUICKINFO,
    names::REFERENCES,
    names::RENAME,
    names::SIGNATURE_HELP,
];

/// Commands mirrored to every running server.
const SHARED: &[&str] = &[
    names::OPEN,
    names::CLOSE,
    names::CHANGE,
    names::UPDATE_OPEN,
    names::CONFIGURE,
    names::COMPILER_OPTIONS_FOR_INFERRED_PROJECTS,
];

/// Classification state shared between the router and the event pump.
#[derive(Debug, Default)]
pub struct RouterState {
    project_loading: AtomicBool,
}

impl RouterState {
    pub fn set_loading(&self, loading: bool) {
        self.project_loading.store(loading, Ordering::Relaxed);
    }

    pub fn is_loading(&self) -> bool {
        self.project_loading.load(Ordering::Relaxed)
    }
}

/// Routes commands when both servers are alive.
#[derive(Debug, Clone)]
pub struct SyntaxRouter {
    state: Arc<RouterState>,
}

impl SyntaxRouter {
    pub fn new(state: Arc<RouterState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &RouterState {
        &self.state
    }

    /// Pick a target for `command`, honoring an explicit override.
    pub fn route(&self, command: &str, target: Option<ExecutionTarget>) -> RouteTarget {
        if let Some(target) = target {
            return match target {
                ExecutionTarget::Syntax => RouteTarget::Syntax,
                ExecutionTarget::Semantic => RouteTarget::Semantic,
            };
        }
        if SHARED.contains(&command) {
            return RouteTarget::Both;
        }
        if SYNTAX_ONLY.contains(&command) {
            return RouteTarget::Syntax;
        }
        if SEMANTIC_ONLY.contains(&command) {
            return RouteTarget::Semantic;
        }
        if self.state.is_loading() && SYNTAX_PREFERRED_WHILE_LOADING.contains(&command) {
            return RouteTarget::Syntax;
        }
        RouteTarget::Semantic
    }

    /// Project-loading toggles: set on `projectLoadingStart`, cleared on
    /// `projectLoadingFinish` or the first diagnostics event.
    pub fn note_event(&self, event: &str) {
        use tsbridge_protocol::message::event_names::*;
        match event {
            PROJECT_LOADING_START => self.state.set_loading(true),
            PROJECT_LOADING_FINISH | SYNTAX_DIAG | SEMANTIC_DIAG | SUGGESTION_DIAG => {
                self.state.set_loading(false)
            }
            _ => {}
        }
    }
}

impl RouteTarget {
    pub fn includes(self, kind: ServerKind) -> bool {
        match self {
            RouteTarget::Both => true,
            RouteTarget::Syntax => kind == ServerKind::Syntax,
            RouteTarget::Semantic => kind == ServerKind::Semantic,
        }
    }
}
