use std::{collections::BTreeMap, io};

use bytes::{Buf, Bytes};
use http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{
    error::Category,
    ser::{Formatter, PrettyFormatter},
    value::RawValue,
};

use super::{limit::MaxBytesReader, Request, Response};

/// Largest request body accepted by [`read_json`].
pub const MAX_BODY_BYTES: u64 = 1_048_576;

/// Top-level object wrapping every response payload. Keys come out sorted.
pub type Envelope<'a, V = serde_json::Value> = BTreeMap<&'a str, V>;

/// Every way a request body can fail to decode.
///
/// Messages are shown to API consumers as-is.
#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("O corpo está com JSON formatado incorretamente (no caractere {offset})")]
    Syntax { offset: u64 },
    #[error("O corpo está com JSON formatado incorretamente")]
    UnexpectedEof,
    #[error("O corpo contém tipo JSON incorreto para o campo {field:?}")]
    TypeMismatch { field: String },
    #[error("O corpo contém tipo JSON incorreto (no caractere {offset})")]
    TypeMismatchAt { offset: u64 },
    #[error("O corpo não pode ficar vazio")]
    Empty,
    #[error("O corpo contém uma chave desconhecida {field:?}")]
    UnknownField { field: String },
    #[error("O corpo não pode ter tamanho maior que {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("O corpo só pode conter um valor JSON")]
    MultipleValues,
    #[error(transparent)]
    Other(serde_json::Error),
}

/// Decodes the request body into `T`, consuming the request.
///
/// The body must hold exactly one JSON value, no bigger than
/// [`MAX_BODY_BYTES`], and every object key in it must be known to `T`.
/// A request without a body is treated as an empty one.
pub fn read_json<T: DeserializeOwned>(request: Request) -> Result<T, JsonError> {
    let body = request.into_body().unwrap_or_default();
    decode_json(body.reader(), MAX_BODY_BYTES)
}

/// Same as [`read_json`], for any byte stream and limit.
///
/// The first value is scanned whole before `T` sees it, so malformed,
/// truncated and oversized bodies are reported ahead of any type or field
/// error inside them.
pub fn decode_json<T, R>(body: R, limit: u64) -> Result<T, JsonError>
where
    T: DeserializeOwned,
    R: io::Read,
{
    let mut reader = MaxBytesReader::new(body, limit);

    let (raw, rest) = {
        let mut de = serde_json::Deserializer::from_reader(&mut reader);
        let scanned = Box::<RawValue>::deserialize(&mut de);
        match scanned {
            Ok(raw) => (raw, de.end()),
            Err(err) => {
                drop(de);
                return Err(classify_scan(err, &reader));
            }
        }
    };

    let value = decode_value(raw.get(), reader.content_start())?;

    if rest.is_err() {
        return Err(JsonError::MultipleValues);
    }

    Ok(value)
}

/// Maps a failure while scanning the raw body.
fn classify_scan<R>(err: serde_json::Error, reader: &MaxBytesReader<R>) -> JsonError {
    match err.classify() {
        Category::Syntax => JsonError::Syntax {
            offset: reader.consumed(),
        },
        Category::Eof if reader.saw_content() => JsonError::UnexpectedEof,
        Category::Eof => JsonError::Empty,
        Category::Io if reader.exceeded() => JsonError::TooLarge {
            limit: reader.limit(),
        },
        Category::Io | Category::Data => JsonError::Other(err),
    }
}

/// Decodes an already well-formed value into `T`, rejecting keys `T` ignores.
///
/// `start` is where the value begins in the body, for offsets.
fn decode_value<T: DeserializeOwned>(raw: &str, start: u64) -> Result<T, JsonError> {
    let mut reader = MaxBytesReader::new(raw.as_bytes(), raw.len() as u64);
    let mut unknown = None;

    let decoded = {
        let mut de = serde_json::Deserializer::from_reader(&mut reader);
        let decoded = serde_path_to_error::deserialize(serde_ignored::Deserializer::new(
            &mut de,
            &mut |path: serde_ignored::Path| {
                unknown.get_or_insert_with(|| ignored_key(&path));
            },
        ));
        decoded
    };

    match (decoded, unknown) {
        (Ok(value), None) => Ok(value),
        (Ok(_), Some(field)) => Err(JsonError::UnknownField { field }),
        (Err(err), unknown) => Err(classify_data(err, start + reader.consumed(), unknown)),
    }
}

/// Maps a failure of the typed decode.
///
/// `unknown` is the first ignored key seen before the failure. Data errors
/// found after it are reported as that key, keeping document order.
fn classify_data(
    err: serde_path_to_error::Error<serde_json::Error>,
    offset: u64,
    unknown: Option<String>,
) -> JsonError {
    let field = path_field(err.path());
    let err = err.into_inner();

    if let Some(field) = unknown {
        return JsonError::UnknownField { field };
    }

    if is_type_mismatch(&err) {
        return match field {
            Some(field) => JsonError::TypeMismatch { field },
            None => JsonError::TypeMismatchAt { offset },
        };
    }

    match denied_field(&err) {
        Some(field) => JsonError::UnknownField { field },
        None => JsonError::Other(err),
    }
}

fn ignored_key(path: &serde_ignored::Path) -> String {
    match path {
        serde_ignored::Path::Map { key, .. } => key.clone(),
        path => path.to_string(),
    }
}

/// Dotted struct field path of a failure; array indices are left out.
fn path_field(path: &serde_path_to_error::Path) -> Option<String> {
    use serde_path_to_error::Segment;

    let keys: Vec<&str> = path
        .iter()
        .filter_map(|segment| match segment {
            Segment::Map { key } => Some(key.as_str()),
            _ => None,
        })
        .collect();

    (!keys.is_empty()).then(|| keys.join("."))
}

#[inline]
fn is_type_mismatch(err: &serde_json::Error) -> bool {
    let msg = err.to_string();
    msg.starts_with("invalid type: ") || msg.starts_with("invalid value: ")
}

/// Key rejected by a target declaring `#[serde(deny_unknown_fields)]`.
fn denied_field(err: &serde_json::Error) -> Option<String> {
    let msg = err.to_string();
    let rest = msg.strip_prefix("unknown field `")?;
    let end = memchr::memchr(b'`', rest.as_bytes())?;

    Some(rest[..end].to_string())
}

/// Encodes `data` as a tab indented JSON response.
///
/// Caller headers are copied first; `Content-Type` is always
/// `application/json`. Nothing is built if `data` fails to serialize.
pub fn write_json<V: Serialize>(
    status: StatusCode,
    data: &Envelope<'_, V>,
    headers: &HeaderMap,
) -> Result<Response, serde_json::Error> {
    let mut body = Vec::with_capacity(128);
    let mut ser = serde_json::Serializer::with_formatter(&mut body, HtmlSafeFormatter::new());
    data.serialize(&mut ser)?;
    body.push(b'\n');

    let mut response = http::Response::new(Some(Bytes::from(body)));
    for (key, value) in headers {
        response.headers_mut().append(key, value.clone());
    }

    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static(mime::APPLICATION_JSON.as_ref()),
    );
    *response.status_mut() = status;

    Ok(response)
}

/// Pretty printer indenting with tabs that also escapes `<`, `>`, `&` and the
/// JavaScript line separators, so bodies are safe to embed in HTML.
struct HtmlSafeFormatter(PrettyFormatter<'static>);

impl HtmlSafeFormatter {
    fn new() -> Self {
        Self(PrettyFormatter::with_indent(b"\t"))
    }
}

impl Formatter for HtmlSafeFormatter {
    #[inline]
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    #[inline]
    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    #[inline]
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    #[inline]
    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    #[inline]
    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    #[inline]
    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    #[inline]
    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    #[inline]
    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object_value(writer)
    }

    #[inline]
    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            let escaped = match ch {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };

            writer.write_all(fragment[start..idx].as_bytes())?;
            writer.write_all(escaped.as_bytes())?;
            start = idx + ch.len_utf8();
        }

        writer.write_all(fragment[start..].as_bytes())
    }
}
