use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request id, stored in the request extensions for handlers to log with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let request_id = Uuid::new_v4();
        let method = req.method().to_string();
        let uri = req.uri().to_string();
        let remote_addr = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        req.extensions_mut().insert(RequestId(request_id));

        info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            remote_addr = %remote_addr,
            "Request started"
        );

        let fut = self.service.call(req);

        Box::pin(async move {
            let mut result = fut.await;
            let duration_ms = start_time.elapsed().as_millis();

            match &mut result {
                Ok(response) => {
                    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }

                    let status = response.status();
                    if status.is_server_error() {
                        warn!(
                            request_id = %request_id,
                            method = %method,
                            uri = %uri,
                            status = status.as_u16(),
                            duration_ms = %duration_ms,
                            "Request completed with server error"
                        );
                    } else {
                        info!(
                            request_id = %request_id,
                            method = %method,
                            uri = %uri,
                            status = status.as_u16(),
                            duration_ms = %duration_ms,
                            "Request completed"
                        );
                    }
                }
                Err(err) => {
                    error!(
                        request_id = %request_id,
                        method = %method,
                        uri = %uri,
                        remote_addr = %remote_addr,
                        duration_ms = %duration_ms,
                        error = %err,
                        "Request failed"
                    );
                }
            }

            result
        })
    }
}
