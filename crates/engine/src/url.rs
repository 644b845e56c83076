use std::any::Any;
use std::borrow::Cow;

use http::Uri;
use once_cell::sync::OnceCell;

use crate::values::Values;

/// The URL capability of a request: a mutable path plus a lazily parsed query.
pub trait Url: Send + Sync {
    fn set_path(&mut self, path: &str);

    /// The percent-decoded request path.
    fn path(&self) -> &str;

    /// The first value of the query parameter `name`, or `""` when absent.
    fn query_value(&self, name: &str) -> &str;

    fn query_values(&self, name: &str) -> &[String];

    /// All query parameters, parsed on first access.
    fn query(&self) -> &Values;

    /// The raw query string without the leading `?`.
    fn raw_query(&self) -> &str;

    /// Access to the backend's native URL type.
    fn as_any(&self) -> &dyn Any;
}

/// [`Url`] built from the request target of an [`http::Uri`].
#[derive(Debug, Clone)]
pub struct RequestUrl {
    path: String,
    raw_query: String,
    query: OnceCell<Values>,
}

impl RequestUrl {
    pub fn new(path: &str, raw_query: &str) -> Self {
        let path = match urlencoding::decode(path) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => path.to_string(),
        };

        Self { path, raw_query: raw_query.to_string(), query: OnceCell::new() }
    }

    pub fn from_uri(uri: &Uri) -> Self {
        Self::new(uri.path(), uri.query().unwrap_or_default())
    }

    /// The path re-encoded for the wire, `/` separators kept.
    pub fn escaped_path(&self) -> String {
        self.path.split('/').map(urlencoding::encode).collect::<Vec<Cow<'_, str>>>().join("/")
    }
}

impl From<&Uri> for RequestUrl {
    fn from(uri: &Uri) -> Self {
        RequestUrl::from_uri(uri)
    }
}

impl Url for RequestUrl {
    fn set_path(&mut self, path: &str) {
        self.path = path.to_string();
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn query_value(&self, name: &str) -> &str {
        self.query().get(name)
    }

    fn query_values(&self, name: &str) -> &[String] {
        self.query().gets(name)
    }

    fn query(&self) -> &Values {
        self.query.get_or_init(|| Values::parse(&self.raw_query))
    }

    fn raw_query(&self) -> &str {
        &self.raw_query
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
