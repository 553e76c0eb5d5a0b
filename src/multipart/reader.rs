//! Streaming `multipart/*` body reader.
//!
//! Parts are handed out one at a time and read through [`std::io::Read`];
//! at most one read chunk plus a delimiter's worth of bytes is buffered, so
//! parts of any size pass through without being held in memory.

use super::content_type::split_header_value;
use super::error::{MultipartError, MultipartResult};
use std::io::{self, Read};
use tracing::trace;

const CHUNK: usize = 16 * 1024;
const MAX_HEADER_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Body,
    BetweenParts,
    Finished,
}

pub struct MultipartReader<R> {
    inner: R,
    buf: Vec<u8>,
    scratch: Box<[u8]>,
    eof: bool,
    /// `\r\n--<boundary>`
    delimiter: Vec<u8>,
    state: State,
    parts: usize,
}

impl<R: Read> MultipartReader<R> {
    pub fn new(inner: R, boundary: &str) -> Self {
        let mut delimiter = b"\r\n--".to_vec();
        delimiter.extend_from_slice(boundary.as_bytes());

        Self {
            inner,
            // The first boundary line has no leading CRLF; seeding one lets a
            // single delimiter pattern match every boundary.
            buf: b"\r\n".to_vec(),
            scratch: vec![0; CHUNK].into_boxed_slice(),
            eof: false,
            delimiter,
            state: State::Preamble,
            parts: 0,
        }
    }

    /// Advance to the next part, skipping whatever is left of the current one.
    /// `Ok(None)` once the closing delimiter is reached.
    pub fn next_part(&mut self) -> MultipartResult<Option<Part<'_, R>>> {
        match self.state {
            State::Finished => return Ok(None),
            State::Body => self.skip_body()?,
            State::Preamble | State::BetweenParts => {}
        }

        if !self.consume_delimiter()? {
            self.state = State::Finished;
            return Ok(None);
        }

        self.fill_to(2)?;
        if self.buf.starts_with(b"--") {
            trace!(parts = self.parts, "closing delimiter");
            self.state = State::Finished;
            return Ok(None);
        }

        // Transport padding after the boundary, up to the line break.
        let end = self.line_end(self.parts + 1)?;
        self.buf.drain(..=end);

        let index = self.parts + 1;
        let headers = self.read_headers(index)?;
        self.parts = index;
        self.state = State::Body;
        trace!(index, "part headers read");

        Ok(Some(Part {
            index,
            headers,
            reader: self,
        }))
    }

    /// Position the buffer just after the next delimiter. Returns `false` when
    /// a body without any delimiter ends, which counts as zero parts.
    fn consume_delimiter(&mut self) -> MultipartResult<bool> {
        loop {
            if let Some(at) = find(&self.buf, &self.delimiter) {
                self.buf.drain(..at + self.delimiter.len());
                return Ok(true);
            }

            if self.state == State::Preamble {
                let keep = self.delimiter.len() - 1;
                if self.buf.len() > keep {
                    let discard = self.buf.len() - keep;
                    self.buf.drain(..discard);
                }
            }

            if !self.fill().map_err(MultipartError::from_read)? {
                return match self.state {
                    State::Preamble => Ok(false),
                    _ => Err(MultipartError::Truncated),
                };
            }
        }
    }

    fn read_headers(&mut self, index: usize) -> MultipartResult<PartHeaders> {
        let mut headers = PartHeaders::default();
        let mut consumed = 0;

        loop {
            let end = self.line_end(index)?;
            consumed += end + 1;
            if consumed > MAX_HEADER_BYTES {
                return Err(MultipartError::HeadersTooLarge {
                    index,
                    limit: MAX_HEADER_BYTES,
                });
            }

            let raw: Vec<u8> = self.buf.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);

            if line.is_empty() {
                return Ok(headers);
            }

            if line.starts_with([' ', '\t']) {
                // Folded continuation of the previous header.
                match headers.entries.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                    }
                    None => {
                        return Err(MultipartError::MalformedHeaders {
                            index,
                            line: line.to_string(),
                        });
                    }
                }
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(MultipartError::MalformedHeaders {
                    index,
                    line: line.to_string(),
                });
            };
            headers
                .entries
                .push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    /// Index of the next `\n` in the buffer, reading more as needed.
    fn line_end(&mut self, index: usize) -> MultipartResult<usize> {
        loop {
            if let Some(end) = self.buf.iter().position(|&b| b == b'\n') {
                return Ok(end);
            }
            if self.buf.len() > MAX_HEADER_BYTES {
                return Err(MultipartError::HeadersTooLarge {
                    index,
                    limit: MAX_HEADER_BYTES,
                });
            }
            if !self.fill().map_err(MultipartError::from_read)? {
                return Err(MultipartError::Truncated);
            }
        }
    }

    fn fill_to(&mut self, len: usize) -> MultipartResult<()> {
        while self.buf.len() < len {
            if !self.fill().map_err(MultipartError::from_read)? {
                return Err(MultipartError::Truncated);
            }
        }
        Ok(())
    }

    /// Append one read from the inner stream. `false` at end of stream.
    fn fill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }

        let read = loop {
            match self.inner.read(&mut self.scratch) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        };
        self.buf.extend_from_slice(&self.scratch[..read]);

        if read == 0 {
            self.eof = true;
        }
        Ok(read > 0)
    }

    fn read_body(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.state != State::Body || out.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(at) = find(&self.buf, &self.delimiter) {
                if at == 0 {
                    self.state = State::BetweenParts;
                    return Ok(0);
                }
                return Ok(self.take(at, out));
            }

            // Bytes that could start a delimiter split across reads stay buffered.
            let safe = self.buf.len().saturating_sub(self.delimiter.len() - 1);
            if safe > 0 {
                return Ok(self.take(safe, out));
            }

            if !self.fill()? {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    MultipartError::Truncated.to_string(),
                ));
            }
        }
    }

    fn take(&mut self, available: usize, out: &mut [u8]) -> usize {
        let n = available.min(out.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf.drain(..n);
        n
    }

    fn skip_body(&mut self) -> MultipartResult<()> {
        let mut scratch = [0u8; 8 * 1024];
        while self.read_body(&mut scratch).map_err(MultipartError::from_read)? > 0 {}
        Ok(())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Headers of one part, in arrival order. Lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    entries: Vec<(String, String)>,
}

impl PartHeaders {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One part of a multipart body. Reading yields the part's payload.
pub struct Part<'a, R> {
    index: usize,
    headers: PartHeaders,
    reader: &'a mut MultipartReader<R>,
}

impl<R> Part<'_, R> {
    /// 1-based position in the stream.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn headers(&self) -> &PartHeaders {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type").filter(|v| !v.is_empty())
    }

    pub fn content_location(&self) -> Option<&str> {
        self.headers
            .get("Content-Location")
            .filter(|v| !v.is_empty())
    }

    /// The `filename` parameter of `Content-Disposition`, if any.
    pub fn disposition_filename(&self) -> Option<String> {
        let disposition = self.headers.get("Content-Disposition")?;
        split_header_value(disposition)
            .1
            .into_iter()
            .find(|(name, _)| name == "filename")
            .map(|(_, value)| value)
            .filter(|value| !value.is_empty())
    }
}

impl<R: Read> Read for Part<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read_body(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    fn body(boundary: &str, parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (headers, payload) in parts {
            out.extend_from_slice(format!("--{boundary}\r\n{headers}\r\n\r\n").as_bytes());
            out.extend_from_slice(payload);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        out
    }

    fn collect<R: Read>(mut reader: MultipartReader<R>) -> Vec<(PartHeaders, Vec<u8>)> {
        let mut parts = Vec::new();
        while let Some(mut part) = reader.next_part().unwrap() {
            let mut payload = Vec::new();
            part.read_to_end(&mut payload).unwrap();
            parts.push((part.headers().clone(), payload));
        }
        parts
    }

    #[test]
    fn splits_parts_regardless_of_read_size() {
        let data = body(
            "XyZ",
            &[
                ("Content-Type: application/dicom", b"DICM\r\n--Xy-not-a-boundary"),
                ("Content-Type: application/dicom", b""),
                ("content-type: application/dicom", &[0u8; 40_000]),
            ],
        );

        for step in [1, 3, 7, 64, 100_000] {
            let parts = collect(MultipartReader::new(
                Trickle {
                    data: &data,
                    step,
                },
                "XyZ",
            ));
            assert_eq!(parts.len(), 3, "step {step}");
            assert_eq!(parts[0].1, b"DICM\r\n--Xy-not-a-boundary".to_vec());
            assert!(parts[1].1.is_empty());
            assert_eq!(parts[2].1.len(), 40_000);
            assert_eq!(parts[2].0.get("Content-Type"), Some("application/dicom"));
        }
    }

    #[test]
    fn unread_parts_are_skipped() {
        let data = body("b", &[("X-A: 1", b"first"), ("X-A: 2", b"second")]);
        let mut reader = MultipartReader::new(&data[..], "b");

        let first = reader.next_part().unwrap().unwrap();
        assert_eq!(first.index(), 1);

        let mut second = reader.next_part().unwrap().unwrap();
        assert_eq!(second.index(), 2);
        let mut payload = String::new();
        second.read_to_string(&mut payload).unwrap();
        assert_eq!(payload, "second");

        assert!(reader.next_part().unwrap().is_none());
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn preamble_epilogue_and_folded_headers() {
        let data = b"ignored preamble\r\n--b\r\nContent-Location: /a\r\n  /b\r\n\r\nxyz\r\n--b--\r\nepilogue";
        let parts = collect(MultipartReader::new(&data[..], "b"));
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].0.get("content-location"), Some("/a /b"));
        assert_eq!(parts[0].1, b"xyz".to_vec());
    }

    #[test]
    fn zero_parts_and_empty_body() {
        assert!(collect(MultipartReader::new(&b"--b--\r\n"[..], "b")).is_empty());
        assert!(collect(MultipartReader::new(&b""[..], "b")).is_empty());
    }

    #[test]
    fn truncated_body_fails_while_reading() {
        let data = b"--b\r\nContent-Type: application/dicom\r\n\r\npartial payload";
        let mut reader = MultipartReader::new(&data[..], "b");
        let mut part = reader.next_part().unwrap().unwrap();
        let err = part.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn truncated_headers_fail() {
        let mut reader = MultipartReader::new(&b"--b\r\nContent-Type: app"[..], "b");
        assert!(matches!(reader.next_part(), Err(MultipartError::Truncated)));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let mut reader = MultipartReader::new(&b"--b\r\nnot a header\r\n\r\nx\r\n--b--"[..], "b");
        assert!(matches!(
            reader.next_part(),
            Err(MultipartError::MalformedHeaders { index: 1, .. })
        ));
    }

    #[test]
    fn disposition_filename_is_exposed() {
        let data = body(
            "b",
            &[(r#"Content-Disposition: attachment; filename="scan.dcm""#, b"1")],
        );
        let mut reader = MultipartReader::new(&data[..], "b");
        let part = reader.next_part().unwrap().unwrap();
        assert_eq!(part.disposition_filename().as_deref(), Some("scan.dcm"));
        assert_eq!(part.content_type(), None);
    }

    #[test]
    fn one_oversized_header_line_is_rejected() {
        let header = format!("X-Pad: {}", "a".repeat(20_000));
        let data = body("b", &[(header.as_str(), b"x")]);
        let mut reader = MultipartReader::new(&data[..], "b");
        assert!(matches!(
            reader.next_part(),
            Err(MultipartError::HeadersTooLarge { index: 1, limit: MAX_HEADER_BYTES })
        ));
    }

    #[test]
    fn many_header_lines_past_the_limit_are_rejected() {
        let header = (0..400)
            .map(|i| format!("X-Pad-{i:04}: {}", "a".repeat(54)))
            .collect::<Vec<_>>()
            .join("\r\n");
        let data = body("b", &[(header.as_str(), b"x")]);

        for step in [5, CHUNK] {
            let mut reader = MultipartReader::new(
                Trickle {
                    data: &data,
                    step,
                },
                "b",
            );
            assert!(
                matches!(
                    reader.next_part(),
                    Err(MultipartError::HeadersTooLarge { index: 1, .. })
                ),
                "step {step}"
            );
        }
    }

    #[test]
    fn headers_keep_arrival_order() {
        let data = body("b", &[("X-B: 2\r\nx-a: 1\r\nContent-Type: text/plain", b"")]);
        let mut reader = MultipartReader::new(&data[..], "b");
        let part = reader.next_part().unwrap().unwrap();
        let headers: Vec<_> = part.headers().iter().collect();
        assert_eq!(
            headers,
            vec![("X-B", "2"), ("x-a", "1"), ("Content-Type", "text/plain")]
        );
    }

    #[test]
    fn skipping_a_truncated_part_is_truncation() {
        let data = b"--b\r\nX-A: 1\r\n\r\npartial payload";
        let mut reader = MultipartReader::new(&data[..], "b");
        reader.next_part().unwrap().unwrap();
        assert!(matches!(reader.next_part(), Err(MultipartError::Truncated)));
    }
}
