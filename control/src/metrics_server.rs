//! `/metrics` endpoint
//!
//! Plain HTTP/1 listener exposing [`gather_controller_metrics`] in the
//! Prometheus text format. Every other path answers 404.

use crate::apis::metrics::gather_controller_metrics;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Build the response for one request
pub fn metrics_response<B>(req: &Request<B>) -> Response<Full<Bytes>> {
    if req.uri().path() != "/metrics" || req.method() != Method::GET {
        return plain(StatusCode::NOT_FOUND, "not found\n".to_string());
    }

    match gather_controller_metrics() {
        Ok(text) => {
            let mut response = plain(StatusCode::OK, text);
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(e) => {
            error!("{}", e);
            plain(StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e))
        }
    }
}

fn plain(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

/// Serve metrics on `bind_addr` until the task is dropped
pub async fn serve_metrics(bind_addr: &str) -> Result<(), String> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| format!("Failed to bind metrics listener to {}: {}", bind_addr, e))?;
    info!("Metrics endpoint listening on {}/metrics", bind_addr);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Metrics accept error: {}", e);
                continue;
            }
        };
        debug!("Metrics scrape from {}", peer);

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(|req: Request<hyper::body::Incoming>| async move {
                Ok::<_, Infallible>(metrics_response(&req))
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Metrics connection error: {}", e);
            }
        });
    }
}
