//! The cancellation pipe
//!
//! tsserver polls for the existence of `<prefix><seq>`; the prefix is handed
//! to it at spawn time as `--cancellationPipeName <prefix>*`. Touching the
//! file is the whole protocol; tsserver deletes it once observed.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;

use tracing::debug;
use tsbridge_protocol::message::Seq;

/// Writer side of the cancellation pipe. One per server process.
#[derive(Debug, Clone)]
pub struct PipeCanceller {
    prefix: PathBuf,
}

impl PipeCanceller {
    pub fn new(prefix: PathBuf) -> Self {
        Self { prefix }
    }

    /// The value for `--cancellationPipeName`, with the trailing `*` the
    /// server substitutes each request's seq into.
    pub fn pipe_arg(&self) -> String {
        format!("{}*", self.prefix.display())
    }

    /// Ask the server to abandon work on `seq`.
    pub fn request_cancellation(&self, seq: Seq) -> io::Result<()> {
        let mut path = self.prefix.as_os_str().to_owned();
        path.push(seq.to_string());
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(PathBuf::from(path))?;
        debug!(seq, "cancellation requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_touches_seq_file() {
        let dir = tempfile::tempdir().unwrap();
        let canceller = PipeCanceller::new(dir.path().join("tscancellation-"));
        canceller.request_cancellation(42).unwrap();
        assert!(dir.path().join("tscancellation-42").exists());
    }

    #[test]
    fn test_pipe_arg_ends_with_star() {
        let canceller = PipeCanceller::new(PathBuf::from("/tmp/x/tscancellation-"));
        assert!(canceller.pipe_arg().ends_with('*'));
    }
}
