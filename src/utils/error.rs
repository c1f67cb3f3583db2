//! Error handling for the Kei compiler mid-end.
//!
//! The mid-end assumes a well-typed input (see the error handling design
//! notes): the checker has already rejected anything a user could have
//! gotten wrong. Every error that can still occur here is an internal
//! invariant violation, not a user-facing diagnostic. We still return
//! `Result` instead of panicking so a driver walking many functions (or
//! modules) can report which one failed instead of aborting the whole
//! run.

use thiserror::Error;

/// Result type alias used throughout the mid-end.
pub type Result<T> = std::result::Result<T, Error>;

/// Mid-end error. Every variant here represents a bug in this crate, not
/// in the program being compiled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A generic internal invariant was violated. `pass` names the stage
    /// that detected it (e.g. `"mem2reg::rename"`, `"dessa::sequence"`).
    #[error("internal error in {pass}: {message}")]
    Internal { pass: &'static str, message: String },

    /// A terminator or φ referenced a block id absent from the function.
    #[error("function `{func}` has a dangling block reference bb{block}")]
    DanglingBlock { func: String, block: usize },

    /// A φ node's incoming list did not have exactly one entry per
    /// predecessor.
    #[error("function `{func}` block bb{block} has a malformed phi for {var}")]
    MalformedPhi { func: String, block: usize, var: String },
}

/// Construct an [`Error::Internal`] tagged with the pass name. Used in
/// place of `panic!`/`unreachable!` for conditions that indicate a bug in
/// this crate rather than in the compiled program, so failures can be
/// threaded back through `Result` instead of aborting the process.
macro_rules! bug {
    ($pass:expr, $($arg:tt)*) => {
        $crate::utils::Error::Internal { pass: $pass, message: format!($($arg)*) }
    };
}

pub(crate) use bug;
