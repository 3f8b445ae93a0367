use std::{fmt::Write, str::from_utf8};

use bytes::Buf;
use http::{header::CONTENT_LENGTH, request::Builder, Error as HttpError, Method, Uri, Version};
use memchr::memmem;
use once_cell::sync::Lazy;
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    error::{RequestError, ResponseError},
    http::{json::MAX_BODY_BYTES, LINE_DELIMITER, REQUEST_DELIMITER},
};

use super::{Request, Response};

static FINDER: Lazy<memmem::Finder> = Lazy::new(|| memmem::Finder::new(LINE_DELIMITER));

/// Frames one request per connection and writes the response back.
///
/// At most `body_limit + 1` body bytes are ever buffered: anything beyond
/// that is left on the socket, and the extra byte is enough for the JSON
/// decoder to notice the body is too large.
pub struct ConnectionCodec {
    req: Option<(Builder, usize)>,
    body_limit: usize,
}

impl ConnectionCodec {
    pub fn new(body_limit: u64) -> Self {
        Self {
            req: None,
            body_limit: usize::try_from(body_limit).unwrap_or(usize::MAX),
        }
    }
}

impl Default for ConnectionCodec {
    fn default() -> Self {
        Self::new(MAX_BODY_BYTES)
    }
}

impl Decoder for ConnectionCodec {
    type Item = Request;

    type Error = RequestError;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (req, len) = match self.req.take() {
            Some(req) => req,
            None => {
                let Some(position) = memmem::find(&src, REQUEST_DELIMITER) else {
                    return Ok(None);
                };

                let req = src.split_to(position);
                let req = request_from_slice(&req)?;
                src.advance(REQUEST_DELIMITER.len());

                let Some(content_length) = req.headers_ref().and_then(|map| map.get(CONTENT_LENGTH)) else {
                    return req.body(None).map(Some).map_err(RequestError::HttpError);
                };

                let content_length = content_length.to_str()?.parse::<usize>()?;

                (req, content_length.min(self.body_limit.saturating_add(1)))
            }
        };

        if src.len() < len {
            src.reserve(len - src.len());
            self.req = Some((req, len));
            return Ok(None);
        }

        req.body(Some(src.split_to(len).freeze()))
            .map(Some)
            .map_err(RequestError::HttpError)
    }
}

#[inline]
fn request_from_slice(buf: &[u8]) -> Result<Builder, RequestError> {
    let mut buf = from_utf8(buf)?;
    let mut request_line = split_to_delimiter(&mut buf)?;

    //request line = "METHOD PATH HTTP/VERSION\r\n"
    let method = split_to_byte(&mut request_line, b' ')?;
    let path = split_to_byte(&mut request_line, b' ')?;
    let version = request_line;

    let mut builder = http::Request::builder()
        .method(Method::try_from(method).map_err(HttpError::from)?)
        .uri(Uri::try_from(path).map_err(HttpError::from)?)
        .version(match version {
            "HTTP/0.9" => Version::HTTP_09,
            "HTTP/1.0" => Version::HTTP_10,
            "HTTP/1.1" => Version::HTTP_11,
            "HTTP/2.0" => Version::HTTP_2,
            "HTTP/3.0" => Version::HTTP_3,
            _ => return Err(RequestError::UnsupportedVersion),
        });

    // header = "Name: Value\r\n"
    while let Ok(mut header) = split_to_delimiter(&mut buf) {
        let key = split_to_byte(&mut header, b':')?;
        builder = builder.header(key, header.trim_start());
    }

    Ok(builder)
}

#[inline]
fn split_to_byte<'a>(buf: &mut &'a str, byte: u8) -> Result<&'a str, RequestError> {
    memchr::memchr(byte, buf.as_bytes())
        .map(|e| {
            let part = &buf[..e];
            *buf = &buf[e + 1..];
            part
        })
        .ok_or(RequestError::InvalidFormat)
}

#[inline]
fn split_to_delimiter<'a>(buf: &mut &'a str) -> Result<&'a str, RequestError> {
    if buf.is_empty() {
        return Err(RequestError::InvalidFormat);
    }

    match FINDER.find(buf.as_bytes()) {
        Some(pos) => {
            let part = &buf[..pos];
            *buf = &buf[pos + LINE_DELIMITER.len()..];
            Ok(part)
        }
        None => {
            let part = &buf[..];
            *buf = &buf[part.len()..];
            Ok(part)
        }
    }
}

impl Encoder<Response> for ConnectionCodec {
    type Error = ResponseError;

    fn encode(&mut self, response: Response, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
        // status line = "HTTP/VERSION CODE REASON\r\n"
        write!(dst, "{:?} {}\r\n", response.version(), response.status())?;

        for (key, value) in response.headers() {
            dst.extend_from_slice(key.as_str().as_bytes());
            dst.extend_from_slice(b": ");
            dst.extend_from_slice(value.as_bytes());
            dst.extend_from_slice(LINE_DELIMITER);
        }

        if response.headers().get(CONTENT_LENGTH).is_none() {
            let len = response.body().as_ref().map_or(0, |b| b.len());
            write!(dst, "{}: {}\r\n", CONTENT_LENGTH, len)?;
        }

        dst.extend_from_slice(LINE_DELIMITER);

        if let Some(body) = response.body() {
            dst.extend_from_slice(body);
        }

        Ok(())
    }
}
