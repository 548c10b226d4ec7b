use crate::util::Address;

/// Errors raised while inspecting the remote heap.
///
/// Two of the variants are fatal to the inspection session: they mean the local model of the
/// remote heap has diverged from the target and cannot be repaired locally. The session should
/// abandon the current refresh and report the error. The other variants are recoverable and
/// leave the previously committed model untouched.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TeleError {
    /// The target process could not be locked for inspection.
    #[error("the target process is busy and cannot be inspected")]
    Busy,
    /// The observer's model of the remote heap is internally inconsistent.
    #[error("internal consistency violation: {0}")]
    Inconsistent(String),
    /// A reference state machine received an event its current state does not accept.
    #[error("illegal state transition: {event} in state {state}")]
    IllegalTransition {
        state: &'static str,
        event: &'static str,
    },
    /// A remote read that the refresh depends on failed.
    #[error("unable to read remote memory at {0}")]
    RemoteAccess(Address),
    /// The active collector does not provide the requested facility.
    #[error("not available for this heap scheme: {0}")]
    Unavailable(&'static str),
}

impl TeleError {
    /// Is this error fatal to the inspection session?
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TeleError::Inconsistent(_) | TeleError::IllegalTransition { .. }
        )
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, TeleError>;

/// Returns a [`TeleError::Inconsistent`] from the enclosing function if the condition does not hold.
macro_rules! tele_check {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::util::error::TeleError::Inconsistent(format!($($arg)+)));
        }
    };
}
pub(crate) use tele_check;
