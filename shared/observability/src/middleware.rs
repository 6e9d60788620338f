//! Request logging for the assistant's actix app.
//!
//! Every request gets a [`TraceContext`] in its extensions and an
//! `http_request` span; the trace id is echoed in the response headers.
//! For `/chat` the logged latency is time to first byte, since the body is
//! streamed after the handler returns.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    rc::Rc,
    time::Instant,
};
use tracing::{Instrument, Level};

use crate::trace_context::{TraceContext, TRACE_ID_HEADER};

/// Requests slower than this are logged as warnings.
pub const DEFAULT_SLOW_REQUEST_MS: u64 = 2000;

#[derive(Debug, Clone)]
pub struct RequestLogging {
    service_name: Rc<str>,
    /// Prefixes logged at debug level when they succeed.
    quiet_paths: Rc<[&'static str]>,
    slow_request_ms: u64,
}

impl RequestLogging {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: Rc::from(service_name),
            quiet_paths: Rc::from(&["/health"][..]),
            slow_request_ms: DEFAULT_SLOW_REQUEST_MS,
        }
    }

    pub fn slow_after(mut self, ms: u64) -> Self {
        self.slow_request_ms = ms;
        self
    }

    fn level_for(&self, path: &str, status: u16, elapsed_ms: u64) -> Level {
        if status >= 500 {
            Level::ERROR
        } else if status >= 400 || elapsed_ms > self.slow_request_ms {
            Level::WARN
        } else if self.quiet_paths.iter().any(|p| path.starts_with(p)) {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }
}

/// Middleware for a named service.
pub fn observability(service_name: &str) -> RequestLogging {
    RequestLogging::new(service_name)
}

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingService {
            service: Rc::new(service),
            config: self.clone(),
        }))
    }
}

pub struct RequestLoggingService<S> {
    service: Rc<S>,
    config: RequestLogging,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let config = self.config.clone();

        Box::pin(async move {
            let method = req.method().clone();
            let path = req.path().to_string();
            let trace = TraceContext::from_request(req.request());
            req.extensions_mut().insert(trace.clone());

            let span = tracing::info_span!(
                "http_request",
                service = %config.service_name,
                trace_id = %trace.trace_id,
                method = %method,
                path = %path,
            );

            let started = Instant::now();
            let result = service.call(req).instrument(span).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let mut res = match result {
                Ok(res) => res,
                Err(e) => {
                    tracing::error!(trace_id = %trace.trace_id, elapsed_ms, error = %e, "{} {} failed", method, path);
                    return Err(e);
                }
            };

            if let Ok(value) = HeaderValue::from_str(&trace.trace_id) {
                res.headers_mut()
                    .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
            }

            let status = res.status().as_u16();
            let level = config.level_for(&path, status, elapsed_ms);
            if level == Level::ERROR {
                tracing::error!(trace_id = %trace.trace_id, status, elapsed_ms, "{} {}", method, path);
            } else if level == Level::WARN {
                tracing::warn!(trace_id = %trace.trace_id, status, elapsed_ms, "{} {}", method, path);
            } else if level == Level::DEBUG {
                tracing::debug!(trace_id = %trace.trace_id, status, elapsed_ms, "{} {}", method, path);
            } else {
                tracing::info!(trace_id = %trace.trace_id, status, elapsed_ms, "{} {}", method, path);
            }
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace_context::TraceContextExt;
    use actix_web::{test, web, App, HttpRequest, HttpResponse};

    async fn echo_trace(req: HttpRequest) -> HttpResponse {
        HttpResponse::Ok().body(req.trace_context().trace_id)
    }

    #[actix_web::test]
    async fn test_trace_id_reaches_handler_and_response() {
        let app = test::init_service(
            App::new()
                .wrap(observability("test"))
                .route("/echo", web::get().to(echo_trace)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/echo")
            .insert_header((TRACE_ID_HEADER, "turn-42"))
            .to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.headers().get(TRACE_ID_HEADER).unwrap(), "turn-42");
        assert_eq!(test::read_body(res).await, "turn-42");
    }

    #[::core::prelude::v1::test]
    fn test_level_selection() {
        let logging = RequestLogging::new("test").slow_after(100);
        assert_eq!(logging.level_for("/chat", 500, 1), Level::ERROR);
        assert_eq!(logging.level_for("/ingest", 400, 1), Level::WARN);
        assert_eq!(logging.level_for("/ingest", 200, 101), Level::WARN);
        assert_eq!(logging.level_for("/health", 200, 1), Level::DEBUG);
        assert_eq!(logging.level_for("/chat", 200, 1), Level::INFO);
    }
}
