use std::future::Future;

use crate::utils::future::BoxFuture;

/// Asynchronous request handler used to erase the concrete factory type of a provider.
pub(crate) trait Service<Request> {
    type Response;
    type Error;
    type Future: Future<Output = Result<Self::Response, Self::Error>>;

    fn call(&mut self, request: Request) -> Self::Future;
}

#[inline]
#[must_use]
pub(crate) const fn service_fn<F>(f: F) -> ServiceFn<F> {
    ServiceFn { f }
}

#[derive(Clone)]
pub(crate) struct ServiceFn<F> {
    f: F,
}

impl<F, Fut, Request, Response, Error> Service<Request> for ServiceFn<F>
where
    F: FnMut(Request) -> Fut,
    Fut: Future<Output = Result<Response, Error>>,
{
    type Response = Response;
    type Error = Error;
    type Future = Fut;

    #[inline]
    fn call(&mut self, request: Request) -> Self::Future {
        (self.f)(request)
    }
}

type BoxCloneServiceInner<Request, Response, Error> =
    Box<dyn CloneService<Request, Response = Response, Error = Error, Future = BoxFuture<'static, Result<Response, Error>>> + Send + Sync>;

pub(crate) struct BoxCloneService<Request, Response, Error>(BoxCloneServiceInner<Request, Response, Error>);

impl<Request, Response, Error> BoxCloneService<Request, Response, Error> {
    pub(crate) fn new<S>(inner: S) -> Self
    where
        S: Service<Request, Response = Response, Error = Error> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        Self(Box::new(Pinned(inner)))
    }
}

impl<Request, Response, Error> Clone for BoxCloneService<Request, Response, Error> {
    #[inline]
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

impl<Request, Response, Error> Service<Request> for BoxCloneService<Request, Response, Error> {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response, Error>>;

    #[inline]
    fn call(&mut self, request: Request) -> Self::Future {
        self.0.call(request)
    }
}

trait CloneService<Request>: Service<Request> {
    #[must_use]
    fn clone_box(&self) -> BoxCloneServiceInner<Request, Self::Response, Self::Error>;
}

impl<Request, S> CloneService<Request> for Pinned<S>
where
    S: Service<Request> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    #[inline]
    fn clone_box(&self) -> BoxCloneServiceInner<Request, S::Response, S::Error> {
        Box::new(self.clone())
    }
}

/// Pins the future of the wrapped service so every erased service shares one future type.
#[derive(Clone)]
struct Pinned<S>(S);

impl<Request, S> Service<Request> for Pinned<S>
where
    S: Service<Request>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    #[inline]
    fn call(&mut self, request: Request) -> Self::Future {
        Box::pin(self.0.call(request))
    }
}

#[cfg(test)]
mod tests {
    use std::{convert::Infallible, future::ready};

    use super::{service_fn, BoxCloneService, Service as _};

    #[derive(Clone, Copy)]
    struct Request(bool);
    struct Response(bool);

    #[tokio::test]
    async fn test_service() {
        let mut service = service_fn(|Request(val)| ready(Ok::<_, Infallible>(Response(val))));

        let request = Request(true);
        let response = service.call(request).await.unwrap();

        assert_eq!(request.0, response.0);
    }

    #[tokio::test]
    async fn test_boxed_clone_service() {
        let service = BoxCloneService::new(service_fn(|Request(val)| async move { Ok::<_, Infallible>(Response(!val)) }));
        let mut cloned = service.clone();

        let response = cloned.call(Request(false)).await.unwrap();

        assert!(response.0);
    }
}
