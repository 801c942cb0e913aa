use thiserror::Error;

/// The error kinds a caller of the coordinator can observe. Each maps to
/// exactly one HTTP status at the server boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("decode failed: {0}")]
    DecodeFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Forbidden(_) => "forbidden",
            Error::BadRequest(_) => "bad_request",
            Error::Unsupported(_) => "unsupported",
            Error::DecodeFailed(_) => "decode_failed",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<ffmpeg::Error> for Error {
    fn from(e: ffmpeg::Error) -> Self {
        Error::DecodeFailed(e.to_string())
    }
}
