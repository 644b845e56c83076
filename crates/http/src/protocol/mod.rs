//! HTTP/1.1 protocol types shared by the codec and the connection.
//!
//! - [`Message`], [`PayloadItem`] and [`PayloadSize`]: what the request decoder yields
//! - [`RequestHead`]: a parsed request line plus headers
//! - [`ResponseHead`] and [`ResponseFrame`]: a complete response ready to encode
//! - [`HttpError`], [`ParseError`] and [`SendError`]: connection level errors

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHead;

mod response;
pub use response::ResponseFrame;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
