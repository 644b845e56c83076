//! The request handler abstraction.
//!
//! A [`Handler`] processes a request by writing to its response; errors are not
//! returned but reported through [`Response::error`] so middleware can observe
//! them. [`handler_fn`] adapts a closure into a handler.

use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::request::Request;
use crate::response::Response;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve_http(&self, req: &mut dyn Request, res: &mut dyn Response);
}

/// A shared, type erased handler
pub type BoxHandler = Arc<dyn Handler>;

#[async_trait]
impl<H> Handler for Arc<H>
where
    H: Handler + ?Sized,
{
    async fn serve_http(&self, req: &mut dyn Request, res: &mut dyn Response) {
        (**self).serve_http(req, res).await
    }
}

#[async_trait]
impl<H> Handler for Box<H>
where
    H: Handler + ?Sized,
{
    async fn serve_http(&self, req: &mut dyn Request, res: &mut dyn Response) {
        (**self).serve_http(req, res).await
    }
}

/// A handler backed by a closure, see [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

impl<F> Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn Request, &'a mut dyn Response) -> BoxFuture<'a, ()> + Send + Sync,
{
    async fn serve_http(&self, req: &mut dyn Request, res: &mut dyn Response) {
        (self.f)(req, res).await
    }
}

/// Adapts a closure into a [`Handler`]; serving calls the closure exactly once.
///
/// Panics raised by the closure are not caught here.
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn Request, &'a mut dyn Response) -> BoxFuture<'a, ()> + Send + Sync,
{
    HandlerFn { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standard::{StandardRequest, StandardResponse};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn handler_fn_invokes_closure_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = handler_fn(move |req: &mut dyn Request, res: &mut dyn Response| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let path = req.url().path().to_string();
                res.write_all(path.as_bytes()).unwrap();
            })
        });

        let request = http::Request::get("/hello").body(Bytes::new()).unwrap();
        let mut req = StandardRequest::new(request);
        let mut res = StandardResponse::new();

        handler.serve_http(&mut req, &mut res).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(res.body(), Bytes::from_static(b"/hello"));
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn shared_handler_delegates() {
        let handler: BoxHandler = Arc::new(handler_fn(|_req: &mut dyn Request, res: &mut dyn Response| {
            Box::pin(async move {
                res.write_header(http::StatusCode::ACCEPTED);
            })
        }));
        let boxed: Box<dyn Handler> = Box::new(handler.clone());

        let mut req = StandardRequest::new(http::Request::get("/").body(Bytes::new()).unwrap());
        let mut res = StandardResponse::new();
        boxed.serve_http(&mut req, &mut res).await;

        assert_eq!(res.status(), 202);
    }
}
