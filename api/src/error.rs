use std::{num::ParseIntError, str::Utf8Error};

use http::header::ToStrError;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid request: {0}")]
    HttpError(#[from] http::Error),
    #[error("request head is not valid utf-8: {0}")]
    Utf8(#[from] Utf8Error),
    #[error("invalid header value: {0}")]
    HeaderValue(#[from] ToStrError),
    #[error("invalid content length: {0}")]
    ContentLength(#[from] ParseIntError),
    #[error("malformed request head")]
    InvalidFormat,
    #[error("unsupported http version")]
    UnsupportedVersion,
}

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to format response head")]
    Fmt(#[from] std::fmt::Error),
}
