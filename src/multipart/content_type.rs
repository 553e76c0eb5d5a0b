//! `Content-Type` / `Content-Disposition` parameter parsing.

use super::error::{MultipartError, MultipartResult};

/// Lower-cased media type without parameters, e.g. `multipart/related`.
pub fn media_type(value: &str) -> String {
    split_header_value(value).0
}

pub fn is_multipart(value: &str) -> bool {
    media_type(value).starts_with("multipart/")
}

/// Extract the boundary token of a `multipart/*` content type.
pub fn parse_boundary(value: &str) -> MultipartResult<String> {
    let malformed = |reason| MultipartError::MalformedContentType {
        content_type: value.to_string(),
        reason,
    };

    let (media_type, params) = split_header_value(value);
    if media_type.is_empty() {
        return Err(malformed("missing media type"));
    }
    if !media_type.starts_with("multipart/") {
        return Err(malformed("not a multipart media type"));
    }

    params
        .into_iter()
        .find(|(name, _)| name == "boundary")
        .map(|(_, boundary)| boundary)
        .filter(|boundary| !boundary.is_empty())
        .ok_or_else(|| malformed("no boundary parameter"))
}

/// Split `type/subtype; a=b; c="d;e"` into the lower-cased first token and
/// its parameters. Parameter names are lower-cased, quoted values unquoted.
pub(crate) fn split_header_value(value: &str) -> (String, Vec<(String, String)>) {
    let mut segments = split_unquoted(value, ';').into_iter();
    let head = segments
        .next()
        .map(|s| s.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let params = segments
        .filter_map(|segment| {
            let (name, raw) = segment.split_once('=')?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return None;
            }
            Some((name, unquote(raw.trim())))
        })
        .collect();

    (head, params)
}

fn split_unquoted(value: &str, separator: char) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            c if c == separator && !quoted => {
                segments.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    segments.push(&value[start..]);
    segments
}

fn unquote(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return raw.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}
