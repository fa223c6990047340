//! Request results as values
//!
//! Every tsserver request resolves to a [`ResponseOutcome`], never an `Err`:
//! a failed request is ordinary data the caller maps to an LSP response.
//! Panics are reserved for actual invariant violations (a misrouted `seq`,
//! a malformed frame), which tear the connection down elsewhere.

/// The result of a single tsserver request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome<T> {
    /// `success: true` with a body.
    Response(T),
    /// `success: true` with no body; a successful empty result.
    NoContent,
    /// Cancelled locally, by token, or by resource change.
    Cancelled(String),
    /// No server was running to take the request.
    NoServer,
    /// The server answered `success: false`.
    ServerError(String),
}

impl<T> ResponseOutcome<T> {
    /// Map the body type, leaving the other arms untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResponseOutcome<U> {
        match self {
            ResponseOutcome::Response(body) => ResponseOutcome::Response(f(body)),
            ResponseOutcome::NoContent => ResponseOutcome::NoContent,
            ResponseOutcome::Cancelled(reason) => ResponseOutcome::Cancelled(reason),
            ResponseOutcome::NoServer => ResponseOutcome::NoServer,
            ResponseOutcome::ServerError(message) => ResponseOutcome::ServerError(message),
        }
    }

    /// The body, if any arm carries one.
    pub fn into_body(self) -> Option<T> {
        match self {
            ResponseOutcome::Response(body) => Some(body),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResponseOutcome::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_preserves_non_body_arms() {
        let cancelled: ResponseOutcome<u32> = ResponseOutcome::Cancelled("token".into());
        assert_eq!(
            cancelled.map(|n| n.to_string()),
            ResponseOutcome::Cancelled("token".into())
        );

        let response = ResponseOutcome::Response(7u32);
        assert_eq!(
            response.map(|n| n.to_string()),
            ResponseOutcome::Response("7".into())
        );
    }
}
