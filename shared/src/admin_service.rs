//! Liveness and readiness endpoints served on the admin listener.

use crate::http::{make_boxed_error_response, make_text_response};
use http::{Method, Request, Response, StatusCode};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type ReadinessProbe = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
pub struct AdminService {
    is_ready: ReadinessProbe,
}

impl AdminService {
    pub fn new(is_ready: ReadinessProbe) -> Self {
        Self { is_ready }
    }

    fn respond(&self, method: &Method, path: &str) -> Response<BoxBody<Bytes, Infallible>> {
        if method != Method::GET {
            return make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
        }

        match path {
            "/health" => make_text_response("ok\n"),
            "/ready" if (self.is_ready)() => make_text_response("ok\n"),
            "/ready" => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
            _ => make_boxed_error_response(StatusCode::NOT_FOUND),
        }
    }
}

impl Service<Request<Incoming>> for AdminService {
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let response = self.respond(req.method(), req.uri().path());
        Box::pin(async move { Ok(response) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_routes() {
        let ready = Arc::new(AtomicBool::new(false));
        let probe_flag = ready.clone();
        let service = AdminService::new(Arc::new(move || probe_flag.load(Ordering::Relaxed)));

        assert_eq!(
            service.respond(&Method::GET, "/health").status(),
            StatusCode::OK
        );
        assert_eq!(
            service.respond(&Method::GET, "/ready").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        ready.store(true, Ordering::Relaxed);
        assert_eq!(
            service.respond(&Method::GET, "/ready").status(),
            StatusCode::OK
        );
        assert_eq!(
            service.respond(&Method::GET, "/unknown").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            service.respond(&Method::POST, "/health").status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
