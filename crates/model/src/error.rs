use std::fmt::{self, Display};

/// Coarse classes of provider failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The prompt or the answer was blocked.
    Moderated,
    /// Quota or rate limit hit, worth retrying later.
    RateLimitExceeded,
    /// The provider could not be reached, or the connection broke while
    /// the response was streaming.
    Transport,
    /// Anything else, e.g. a malformed reply.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Moderated => write!(f, "moderated"),
            ErrorKind::RateLimitExceeded => write!(f, "rate limit exceeded"),
            ErrorKind::Transport => write!(f, "transport error"),
            ErrorKind::Other => write!(f, "provider error"),
        }
    }
}
