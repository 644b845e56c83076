//! [`Request`](crate::Request) and [`Response`](crate::Response) adapters over
//! the `http` crate types, with fully buffered bodies.

mod request;
mod response;

pub use request::StandardRequest;
pub use response::{BodyBuffer, ResponseParts, StandardResponse};
