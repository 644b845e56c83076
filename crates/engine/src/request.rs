use std::any::Any;
use std::io;
use std::net::SocketAddr;

use http::{Method, Uri, Version};
use tokio_util::sync::CancellationToken;

use crate::error::RequestError;
use crate::header::Header;
use crate::multipart::{FilePart, MultipartForm};
use crate::url::Url;
use crate::values::Values;

/// A readable request body.
pub type Body = Box<dyn io::Read + Send + Sync>;

/// The request capability a handler reads from.
///
/// Form accessors parse lazily: the first call consumes the body, later calls
/// return the cached result, and the body is restored for later readers.
pub trait Request: Send + Sync {
    /// `"https"` when the connection is TLS, `"http"` otherwise.
    fn scheme(&self) -> &str;

    /// The `Host` header, falling back to the authority of the request target.
    fn host(&self) -> &str;

    fn uri(&self) -> &Uri;

    fn url(&self) -> &dyn Url;

    fn url_mut(&mut self) -> &mut dyn Url;

    fn header(&self) -> &dyn Header;

    fn header_mut(&mut self) -> &mut dyn Header;

    fn proto(&self) -> Version;

    /// The peer address of the connection, empty when unknown.
    fn remote_address(&self) -> &str;

    fn method(&self) -> &Method;

    fn set_method(&mut self, method: Method);

    fn body(&mut self) -> &mut Body;

    /// Replaces the body, returning the previous one.
    fn set_body(&mut self, body: Body) -> Body;

    /// The first value of `name` in the merged form, post values first.
    fn form_value(&mut self, name: &str) -> String {
        self.form().get(name).to_string()
    }

    /// Post form values followed by query values.
    fn form(&mut self) -> &Values;

    /// Values of an urlencoded or multipart request body.
    fn post_form(&mut self) -> &Values;

    fn multipart_form(&mut self) -> Result<&MultipartForm, RequestError>;

    /// The first file uploaded under `name`.
    fn form_file(&mut self, name: &str) -> Result<&FilePart, RequestError> {
        self.multipart_form()?.file(name).ok_or_else(|| RequestError::missing_file(name))
    }

    fn is_tls(&self) -> bool;

    fn cookie(&self, name: &str) -> Option<&str>;

    fn referer(&self) -> &str;

    fn user_agent(&self) -> &str;

    /// The request body size in bytes.
    fn size(&self) -> u64;

    /// Username and password of a `Basic` authorization header.
    fn basic_auth(&self) -> Option<(String, String)>;

    /// Cancelled when the engine shuts down or the connection goes away.
    fn cancellation(&self) -> &CancellationToken;

    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Access to the backend's native request type.
    fn as_any(&self) -> &dyn Any;
}
