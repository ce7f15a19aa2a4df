//! Tape I/O error taxonomy.

use thiserror::Error;

/// Errors surfaced by tape backends and the codec.
///
/// Malformed framing (bad checksum, implausible cell width) is *not* an
/// error: the decoder recovers locally by resynchronizing, and checksum
/// residuals are reported in the decoded [`crate::Block`]. Only conditions
/// the caller must act on appear here.
#[derive(Debug, Error)]
pub enum TapeError {
    /// End of tape or read failure: no more pulses are available. Callers
    /// use this to deschedule periodic readers and report that the tape
    /// stopped.
    #[error("no more pulses")]
    NoPulses,

    /// Seek target outside the stream.
    #[error("seek out of range: offset {offset}")]
    SeekRange { offset: i64 },

    /// Underlying file I/O failure (failed open, short read).
    #[error("tape i/o: {0}")]
    Io(#[from] std::io::Error),
}
