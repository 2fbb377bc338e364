//! Common result and error types for the Kiln build engine.

/// The standard result type for operations that can only fail on a bug.
///
/// `Err` indicates a broken internal invariant in Kiln, not a problem with
/// the user's rules. Rule configuration problems are reported through the
/// rule crate's own error type.
pub type KilnResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in Kiln, not a user input problem.
///
/// These errors should never occur during normal operation. If one does
/// occur, a type-erased envelope was built or consumed inconsistently.
#[derive(Debug, thiserror::Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("something broke");
        assert_eq!(format!("{err}"), "internal error: something broke");
    }

    #[test]
    fn ok_path() {
        let r: KilnResult<i32> = Ok(42);
        assert_eq!(r.ok(), Some(42));
    }
}
