pub mod browser;
pub mod capture;
pub mod opener;
pub mod request;

use thiserror::Error;

/// Broad class of a failure, for callers that react per kind rather than per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, nothing was attempted.
    Validation,
    /// No browser could be found, downloaded or started.
    Provisioning,
    /// The browser ran but loading, rendering or saving the page failed.
    Capture,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Request(#[from] request::RequestError),
    #[error(transparent)]
    Capture(#[from] capture::CaptureError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Request(_) => ErrorKind::Validation,
            Error::Capture(capture::CaptureError::Browser(e)) if e.is_provisioning() => ErrorKind::Provisioning,
            Error::Capture(_) => ErrorKind::Capture,
        }
    }
}

impl From<browser::BrowserError> for Error {
    fn from(e: browser::BrowserError) -> Self {
        Error::Capture(e.into())
    }
}
