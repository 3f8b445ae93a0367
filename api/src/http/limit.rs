use std::io::{self, Read};

/// Caps how many bytes can be pulled out of a request body.
///
/// Reads past `limit` fail with an error instead of returning more data, so
/// an oversized body is rejected while it is being parsed. The reader also
/// remembers how far it got and whether anything other than JSON whitespace
/// went through it, which lets the decoder report offsets and tell an empty
/// body apart from a truncated one.
pub struct MaxBytesReader<R> {
    inner: R,
    limit: u64,
    remaining: u64,
    consumed: u64,
    exceeded: bool,
    content_start: Option<u64>,
}

impl<R: Read> MaxBytesReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            limit,
            remaining: limit,
            consumed: 0,
            exceeded: false,
            content_start: None,
        }
    }
}

impl<R> MaxBytesReader<R> {
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn exceeded(&self) -> bool {
        self.exceeded
    }

    pub fn saw_content(&self) -> bool {
        self.content_start.is_some()
    }

    /// Offset of the first non-whitespace byte, or 0 if none was read yet.
    pub fn content_start(&self) -> u64 {
        self.content_start.unwrap_or_default()
    }
}

impl<R: Read> Read for MaxBytesReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.exceeded {
            return Err(too_large());
        }

        if buf.is_empty() {
            return Ok(0);
        }

        // one extra byte tells "exactly at the limit" apart from "over it"
        let window = usize::try_from(self.remaining.saturating_add(1))
            .map_or(buf.len(), |window| window.min(buf.len()));

        let read = self.inner.read(&mut buf[..window])?;
        if read as u64 > self.remaining {
            self.exceeded = true;
            return Err(too_large());
        }

        if self.content_start.is_none() {
            self.content_start = buf[..read]
                .iter()
                .position(|b| !is_whitespace(*b))
                .map(|idx| self.consumed + idx as u64);
        }
        self.remaining -= read as u64;
        self.consumed += read as u64;

        Ok(read)
    }
}

#[inline]
fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

fn too_large() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "request body too large")
}
