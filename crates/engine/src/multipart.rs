//! In-memory `multipart/form-data` parsing.

use std::collections::BTreeMap;

use bytes::Bytes;
use mime::Mime;

use crate::error::RequestError;
use crate::values::Values;

/// An uploaded file of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    field: String,
    filename: String,
    content_type: Option<String>,
    data: Bytes,
}

impl FilePart {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A parsed `multipart/form-data` body: plain fields and uploaded files.
#[derive(Debug, Default, Clone)]
pub struct MultipartForm {
    values: Values,
    files: BTreeMap<String, Vec<FilePart>>,
}

impl MultipartForm {
    /// Parses `body` using the boundary of the `content_type` header value.
    pub fn parse(content_type: &str, body: &Bytes) -> Result<Self, RequestError> {
        let boundary = boundary(content_type)?;
        let delimiter = format!("--{boundary}");
        let delimiter = delimiter.as_bytes();
        let closing = [b"\r\n".as_slice(), delimiter].concat();

        let mut form = MultipartForm::default();

        let mut pos = find(body, delimiter)
            .ok_or_else(|| RequestError::invalid_multipart("missing the first boundary"))?
            + delimiter.len();

        loop {
            let rest = &body[pos..];
            if rest.starts_with(b"--") {
                return Ok(form);
            }
            if !rest.starts_with(b"\r\n") {
                return Err(RequestError::invalid_multipart("boundary must be followed by CRLF"));
            }
            pos += 2;

            let (headers, content_start) = if body[pos..].starts_with(b"\r\n") {
                ("", pos + 2)
            } else {
                let header_end = find(&body[pos..], b"\r\n\r\n")
                    .ok_or_else(|| RequestError::invalid_multipart("unterminated part headers"))?;
                let headers = std::str::from_utf8(&body[pos..pos + header_end])
                    .map_err(|_| RequestError::invalid_multipart("part headers are not utf-8"))?;
                (headers, pos + header_end + 4)
            };

            let content_len = find(&body[content_start..], &closing)
                .ok_or_else(|| RequestError::invalid_multipart("unterminated part body"))?;
            let content = body.slice(content_start..content_start + content_len);

            form.add_part(headers, content);

            pos = content_start + content_len + closing.len();
        }
    }

    fn add_part(&mut self, headers: &str, content: Bytes) {
        let mut disposition = "";
        let mut content_type = None;
        for line in headers.split("\r\n") {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("content-disposition") {
                disposition = value.trim();
            } else if name.trim().eq_ignore_ascii_case("content-type") {
                content_type = Some(value.trim().to_string());
            }
        }

        let Some(field) = disposition_param(disposition, "name") else {
            return;
        };

        match disposition_param(disposition, "filename") {
            Some(filename) => {
                let part = FilePart {
                    field: field.to_string(),
                    filename: filename.to_string(),
                    content_type,
                    data: content,
                };
                self.files.entry(field.to_string()).or_default().push(part);
            }
            None => self.values.add(field, String::from_utf8_lossy(&content)),
        }
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn files(&self) -> &BTreeMap<String, Vec<FilePart>> {
        &self.files
    }

    /// The first file uploaded under `field`.
    pub fn file(&self, field: &str) -> Option<&FilePart> {
        self.files.get(field).and_then(|files| files.first())
    }
}

/// Extracts the boundary of a `multipart/form-data` content type.
pub fn boundary(content_type: &str) -> Result<String, RequestError> {
    let mime = content_type.parse::<Mime>().map_err(|_| RequestError::NotMultipart)?;
    if mime.type_() != mime::MULTIPART || mime.subtype() != mime::FORM_DATA {
        return Err(RequestError::NotMultipart);
    }

    match mime.get_param(mime::BOUNDARY) {
        Some(boundary) if !boundary.as_str().is_empty() => Ok(boundary.as_str().to_string()),
        _ => Err(RequestError::invalid_multipart("missing boundary parameter")),
    }
}

fn disposition_param<'a>(disposition: &'a str, key: &str) -> Option<&'a str> {
    disposition
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(key))
        .map(|(_, value)| value.trim().trim_matches('"'))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
