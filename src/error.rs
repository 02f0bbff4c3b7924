use thiserror::Error;

/// The generic Error type covering all errors this library can return.
///
/// The optimization pass itself has no failure channel — gating and
/// invalidation are infallible by design. The only fallible surface is the
/// construction of the function IR from raw block data, where malformed
/// successor lists must be rejected before any analysis runs over them.
#[derive(Error, Debug)]
pub enum Error {
    /// The control flow structure of a function is malformed, e.g. a block
    /// names a successor index that is out of range.
    #[error("Control flow graph error - {0}")]
    Graph(String),

    /// An empty block list was provided where at least an entry block is
    /// required.
    #[error("Empty input provided")]
    Empty,
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Graph("block 3 names successor 9 of 4".to_string());
        assert_eq!(
            err.to_string(),
            "Control flow graph error - block 3 names successor 9 of 4"
        );
        assert_eq!(Error::Empty.to_string(), "Empty input provided");
    }
}
