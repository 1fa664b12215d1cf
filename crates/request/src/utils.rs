//! Utility macros shared by the facade components.

/// Returns early with an error if a condition is not met.
///
/// Like `assert!`, but returns the error instead of panicking. Used for the
/// sequencing checks that guard every state transition of the facade.
///
/// ```ignore
/// ensure!(self.mode != BodyAccessMode::AsReader, RequestError::illegal_state("reader already opened"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
