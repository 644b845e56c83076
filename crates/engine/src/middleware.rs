//! Middleware: transforms from one handler into another.
//!
//! A [`Chain`] applies its middlewares so that the first one added is the
//! outermost: it sees the request first and the response last.

use std::fmt;
use std::sync::Arc;

use crate::handler::{BoxHandler, Handler};

pub trait Middleware: Send + Sync {
    /// Wraps `next` into a new handler.
    fn wrap(&self, next: BoxHandler) -> BoxHandler;
}

impl<M> Middleware for Arc<M>
where
    M: Middleware + ?Sized,
{
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        (**self).wrap(next)
    }
}

/// A middleware backed by a closure, see [`middleware_fn`].
pub struct MiddlewareFn<F> {
    f: F,
}

impl<F> Middleware for MiddlewareFn<F>
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync,
{
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        (self.f)(next)
    }
}

impl<F> fmt::Debug for MiddlewareFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareFn").finish_non_exhaustive()
    }
}

pub fn middleware_fn<F>(f: F) -> MiddlewareFn<F>
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync,
{
    MiddlewareFn { f }
}

/// An ordered list of middlewares.
#[derive(Clone, Default)]
pub struct Chain {
    inner: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// Wraps `handler` with every middleware, the first added ending up outermost.
    pub fn then<H: Handler + 'static>(&self, handler: H) -> BoxHandler {
        self.wrap(Arc::new(handler))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("len", &self.inner.len()).finish()
    }
}

impl Middleware for Chain {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        self.inner.iter().rev().fold(next, |next, middleware| middleware.wrap(next))
    }
}

pub struct ChainBuilder {
    inner: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for ChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainBuilder").field("len", &self.inner.len()).finish()
    }
}

impl ChainBuilder {
    fn new() -> Self {
        Self { inner: vec![] }
    }

    pub fn add_last<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.inner.push(Arc::new(middleware));
        self
    }

    pub fn add_first<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.inner.insert(0, Arc::new(middleware));
        self
    }

    pub fn build(self) -> Chain {
        Chain { inner: self.inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::request::Request;
    use crate::response::Response;
    use crate::standard::{StandardRequest, StandardResponse};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        journal: Journal,
        next: BoxHandler,
    }

    #[async_trait]
    impl Handler for Recording {
        async fn serve_http(&self, req: &mut dyn Request, res: &mut dyn Response) {
            self.journal.lock().unwrap().push(format!("{} before", self.name));
            self.next.serve_http(req, res).await;
            self.journal.lock().unwrap().push(format!("{} after", self.name));
        }
    }

    fn recording(name: &'static str, journal: &Journal) -> impl Middleware + use<> {
        let journal = journal.clone();
        middleware_fn(move |next| -> BoxHandler { Arc::new(Recording { name, journal: journal.clone(), next }) })
    }

    fn journal_handler(journal: &Journal) -> BoxHandler {
        let journal = journal.clone();
        Arc::new(handler_fn(move |_req: &mut dyn Request, _res: &mut dyn Response| {
            journal.lock().unwrap().push("handler".to_string());
            Box::pin(async {})
        }))
    }

    async fn serve(handler: &BoxHandler) {
        let mut req = StandardRequest::new(http::Request::get("/").body(Bytes::new()).unwrap());
        let mut res = StandardResponse::new();
        handler.serve_http(&mut req, &mut res).await;
    }

    #[tokio::test]
    async fn first_added_is_outermost() {
        let journal = Journal::default();
        let chain = Chain::builder().add_last(recording("a", &journal)).add_last(recording("b", &journal)).build();

        let handler = chain.wrap(journal_handler(&journal));
        serve(&handler).await;

        assert_eq!(*journal.lock().unwrap(), vec!["a before", "b before", "handler", "b after", "a after"]);
    }

    #[tokio::test]
    async fn add_first_prepends() {
        let journal = Journal::default();
        let chain = Chain::builder().add_last(recording("b", &journal)).add_first(recording("a", &journal)).build();
        assert_eq!(chain.len(), 2);

        let handler = chain.wrap(journal_handler(&journal));
        serve(&handler).await;

        assert_eq!(*journal.lock().unwrap(), vec!["a before", "b before", "handler", "b after", "a after"]);
    }

    #[tokio::test]
    async fn empty_chain_returns_handler() {
        let journal = Journal::default();
        let chain = Chain::default();
        assert!(chain.is_empty());

        let handler = chain.then(journal_handler(&journal));
        serve(&handler).await;

        assert_eq!(*journal.lock().unwrap(), vec!["handler"]);
    }

    #[tokio::test]
    async fn nested_chain_keeps_order() {
        let journal = Journal::default();
        let inner = Chain::builder().add_last(recording("b", &journal)).build();
        let outer = Chain::builder().add_last(recording("a", &journal)).add_last(inner).build();

        let handler = outer.wrap(journal_handler(&journal));
        serve(&handler).await;

        assert_eq!(*journal.lock().unwrap(), vec!["a before", "b before", "handler", "b after", "a after"]);
    }

    #[test]
    fn debug_shows_length() {
        let journal = Journal::default();
        let builder = Chain::builder().add_last(recording("a", &journal));
        assert_eq!(format!("{builder:?}"), "ChainBuilder { len: 1 }");

        let chain = builder.add_first(recording("b", &journal)).build();
        assert_eq!(format!("{chain:?}"), "Chain { len: 2 }");
        assert_eq!(format!("{:?}", middleware_fn(|next: BoxHandler| next)), "MiddlewareFn { .. }");
    }
}
