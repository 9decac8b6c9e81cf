use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The webhook did not present the configured shared secret.
    Unauthorized,
    /// The relay refused to open a stream.
    Relay(::sse::Error),
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::Unauthorized => write!(fmt, "Unauthorized"),
            Error::Relay(e) => write!(fmt, "Relay error: {e}"),
        }
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED").into_response(),
            Error::Relay(e) => {
                warn!("Relay error while handling request: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

impl From<::sse::Error> for Error {
    fn from(err: ::sse::Error) -> Self {
        Error::Relay(err)
    }
}
