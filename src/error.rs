use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    /// Remote store has no such item (404)
    NotFound,

    /// Credential does not grant access to the item (403)
    Forbidden,

    /// Validator rejected a newly published value
    BadConfigFormat,

    /// Response was missing something the pull protocol requires
    Protocol(String),

    /// Any other non-success status code
    Status(u16),

    #[from]
    Http(reqwest::Error),

    /// Identifier is not of the form `group.project.name`
    InvalidId(String),
}

impl Error {
    /// Only "not found" and "forbidden" answers are remembered by the miss cache.
    #[must_use]
    pub const fn is_miss_cacheable(&self) -> bool {
        matches!(self, Self::NotFound | Self::Forbidden)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::NotFound => write!(fmt, "not found"),
            Self::Forbidden => write!(fmt, "forbidden"),
            Self::BadConfigFormat => write!(fmt, "bad config format"),
            Self::Protocol(message) => write!(fmt, "protocol error: {message}"),
            Self::Status(code) => write!(fmt, "error status code {code}"),
            Self::Http(e) => write!(fmt, "transport error: {e}"),
            Self::InvalidId(id) => write!(fmt, "invalid gid {id:?}, expected group.project.name"),
        }
    }
}

impl std::error::Error for Error {}
