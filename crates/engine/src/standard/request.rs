use std::any::Any;
use std::fmt;
use std::io;
use std::io::{Cursor, Read};
use std::net::SocketAddr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, HOST, REFERER, USER_AGENT};
use http::{HeaderMap, Method, Uri, Version};
use mime::Mime;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cookie::find_cookie;
use crate::error::RequestError;
use crate::header::Header;
use crate::multipart::{self, MultipartForm};
use crate::request::{Body, Request};
use crate::url::{RequestUrl, Url};
use crate::values::Values;

/// A [`Request`] over an [`http::Request`] whose body is already in memory.
pub struct StandardRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    url: RequestUrl,
    body: Body,
    size: u64,
    remote_address: String,
    peer_addr: Option<SocketAddr>,
    tls: bool,
    cancellation: CancellationToken,
    post_form: Option<Values>,
    form: Option<Values>,
    multipart: Option<MultipartForm>,
}

impl fmt::Debug for StandardRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("version", &self.version)
            .field("size", &self.size)
            .field("remote_address", &self.remote_address)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

impl StandardRequest {
    pub fn new(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        let url = RequestUrl::from_uri(&parts.uri);

        Self {
            method: parts.method,
            url,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            size: body.len() as u64,
            body: Box::new(Cursor::new(body)),
            remote_address: String::new(),
            peer_addr: None,
            tls: false,
            cancellation: CancellationToken::new(),
            post_form: None,
            form: None,
            multipart: None,
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_address = addr.to_string();
        self.peer_addr = Some(addr);
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn header_str(&self, name: &str) -> &str {
        Header::get(&self.headers, name)
    }

    fn content_type(&self) -> Option<Mime> {
        self.header_str(CONTENT_TYPE.as_str()).parse::<Mime>().ok()
    }

    /// Reads the whole body and puts it back as a fresh reader.
    fn buffer_body(&mut self) -> io::Result<Bytes> {
        let mut buf = Vec::new();
        self.body.read_to_end(&mut buf)?;
        let bytes = Bytes::from(buf);
        self.body = Box::new(Cursor::new(bytes.clone()));
        Ok(bytes)
    }

    fn parse_post_form(&mut self) -> Values {
        if !matches!(self.method, Method::POST | Method::PUT | Method::PATCH) {
            return Values::new();
        }

        let Some(content_type) = self.content_type() else {
            return Values::new();
        };

        if content_type.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            return match self.buffer_body() {
                Ok(body) => Values::parse(&String::from_utf8_lossy(&body)),
                Err(e) => {
                    warn!(cause = %e, "can't read urlencoded form body");
                    Values::new()
                }
            };
        }

        if content_type.essence_str() == mime::MULTIPART_FORM_DATA.essence_str() {
            return match self.multipart_form() {
                Ok(form) => form.values().clone(),
                Err(e) => {
                    warn!(cause = %e, "can't parse multipart form body");
                    Values::new()
                }
            };
        }

        Values::new()
    }
}

impl Request for StandardRequest {
    fn scheme(&self) -> &str {
        if self.tls { "https" } else { "http" }
    }

    fn host(&self) -> &str {
        match self.header_str(HOST.as_str()) {
            "" => self.uri.authority().map(|authority| authority.as_str()).unwrap_or_default(),
            host => host,
        }
    }

    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn url(&self) -> &dyn Url {
        &self.url
    }

    fn url_mut(&mut self) -> &mut dyn Url {
        &mut self.url
    }

    fn header(&self) -> &dyn Header {
        &self.headers
    }

    fn header_mut(&mut self) -> &mut dyn Header {
        &mut self.headers
    }

    fn proto(&self) -> Version {
        self.version
    }

    fn remote_address(&self) -> &str {
        &self.remote_address
    }

    fn method(&self) -> &Method {
        &self.method
    }

    fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    fn body(&mut self) -> &mut Body {
        &mut self.body
    }

    fn set_body(&mut self, body: Body) -> Body {
        std::mem::replace(&mut self.body, body)
    }

    fn form(&mut self) -> &Values {
        if self.form.is_none() {
            let mut form = self.post_form().clone();
            form.merge(self.url.query());
            self.form = Some(form);
        }
        self.form.get_or_insert_default()
    }

    fn post_form(&mut self) -> &Values {
        if self.post_form.is_none() {
            let values = self.parse_post_form();
            self.post_form = Some(values);
        }
        self.post_form.get_or_insert_default()
    }

    fn multipart_form(&mut self) -> Result<&MultipartForm, RequestError> {
        if self.multipart.is_none() {
            let content_type = self.header_str(CONTENT_TYPE.as_str()).to_string();
            multipart::boundary(&content_type)?;
            let body = self.buffer_body()?;
            self.multipart = Some(MultipartForm::parse(&content_type, &body)?);
        }
        Ok(self.multipart.get_or_insert_default())
    }

    fn is_tls(&self) -> bool {
        self.tls
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        find_cookie(self.headers.get_all(COOKIE).iter().filter_map(|value| value.to_str().ok()), name)
    }

    fn referer(&self) -> &str {
        self.header_str(REFERER.as_str())
    }

    fn user_agent(&self) -> &str {
        self.header_str(USER_AGENT.as_str())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn basic_auth(&self) -> Option<(String, String)> {
        let value = self.header_str(AUTHORIZATION.as_str());
        let (scheme, credentials) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }

        let decoded = STANDARD.decode(credentials.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some((username.to_string(), password.to_string()))
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
