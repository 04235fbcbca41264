use thiserror::Error;

/// Errors raised while the interpreter is stepping a loaded image.
///
/// These are distinct from [`crate::interpreter::TerminationCause`]: a
/// `TerminationCause` is an expected, clean way for the loop to stop, while
/// a `RuntimeError` means the loop could not continue at all.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("read past the last word of memory at bit-address {0}")]
    EndOfMemory(u64),

    #[error("garbage read of unmapped bit-address {0} under Stop policy")]
    GarbageRead(u64),

    #[error("input device reached end of input")]
    EndOfInput,

    #[error("get_output called with an incomplete (non-multiple-of-8) output bit count")]
    IncompleteOutput,
}
