// crates/seamscale-core/src/error.rs
//
// Error taxonomy shared by every stage of the pipeline.
//
//   Transform       one work item failed; recorded on that item only.
//   Decode          the input file could not be read; aborts that file.
//   Encode / Mux    fatal for the output stream being written.
//   NeedsMoreInput  encoder back-pressure. Never a failure: the driver
//                   simply feeds the next unit.
//   Cancelled       not a failure either; reported distinctly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transform failed: {0}")]
    Transform(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("mux failed: {0}")]
    Mux(String),

    #[error("encoder needs more input")]
    NeedsMoreInput,

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn transform(msg: impl Into<String>) -> Self { Self::Transform(msg.into()) }
    pub fn decode(msg: impl Into<String>)    -> Self { Self::Decode(msg.into()) }
    pub fn encode(msg: impl Into<String>)    -> Self { Self::Encode(msg.into()) }
    pub fn mux(msg: impl Into<String>)       -> Self { Self::Mux(msg.into()) }

    /// True for errors that must abort the output stream currently being written.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NeedsMoreInput | Self::Cancelled | Self::Transform(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let e = Error::encode("open H.264 encoder: not found");
        assert_eq!(e.to_string(), "encode failed: open H.264 encoder: not found");
    }

    #[test]
    fn back_pressure_and_cancel_are_not_fatal() {
        assert!(!Error::NeedsMoreInput.is_fatal());
        assert!(!Error::Cancelled.is_fatal());
        assert!(Error::mux("write trailer").is_fatal());
        assert!(Error::Cancelled.is_cancelled());
    }

    #[test]
    fn io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.png");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("missing.png"));
    }
}
