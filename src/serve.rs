//! Blocking HTTP front end.
//!
//! `tiny_http` accepts connections on one thread and hands each request to a
//! rayon pool, so a slow `convert` only ties up its own worker. Routing and
//! response building live in [`respond`], which is pure apart from the
//! service call and is what the tests drive.
//!
//! | Path | Response |
//! |---|---|
//! | `/` | `200` banner |
//! | `/{prefix}/{id}` | `303` to `/{prefix}/{id}/info.json` |
//! | `/{prefix}/{id}/info.json` | `200` JSON, CORS open |
//! | `/{prefix}/{id}/{region}/{size}/{rotation}/{quality}.{format}` | `200` image bytes |
//! | anything else | `404` |

use crate::iiif::{COMPLIANCE_LEVEL_URI, Route};
use crate::imaging::ImageBackend;
use crate::service::{ImageService, ServiceError};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

const BANNER: &str = "iiif server";
const JSON: &str = "application/json";
const JSON_LD: &str = "application/ld+json";
const PLAIN: &str = "text/plain; charset=utf-8";

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("failed to bind {address}: {message}")]
    Bind { address: String, message: String },
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// A fully built response, independent of the connection it goes out on.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", content_type.to_string())],
            body,
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, PLAIN, body.into().into_bytes())
    }

    fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// First value of header `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        let mut response = Response::from_data(self.body).with_status_code(StatusCode(self.status));
        for (name, value) in self.headers {
            match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                Ok(header) => response.add_header(header),
                Err(()) => log::warn!("dropping unencodable {name} header {value:?}"),
            }
        }
        response
    }
}

/// HTTP status for a service error.
pub fn status_for(err: &ServiceError) -> u16 {
    match err {
        ServiceError::Parse(_) | ServiceError::NotAnImageRequest(_) => 400,
        ServiceError::NoSupportedFormat(_) => 404,
        ServiceError::SourceProbeFailed(_)
        | ServiceError::Synthesis(_)
        | ServiceError::ExternalProcessFailed(_)
        | ServiceError::BuildAbandoned => 500,
    }
}

/// `application/ld+json` if the client lists it in `Accept`, else plain JSON.
pub fn info_content_type(accept: Option<&str>) -> &'static str {
    let wants_ld = accept.is_some_and(|accept| {
        accept
            .split(',')
            .map(|range| range.split(';').next().unwrap_or("").trim())
            .any(|media| media.eq_ignore_ascii_case(JSON_LD))
    });
    if wants_ld { JSON_LD } else { JSON }
}

/// Route `url` and build the reply.
pub fn respond<B: ImageBackend>(
    service: &ImageService<B>,
    url: &str,
    accept: Option<&str>,
) -> Reply {
    let route = match Route::parse(url) {
        Ok(Some(route)) => route,
        Ok(None) => return Reply::text(404, "404 Not Found"),
        Err(e) => return Reply::text(400, format!("Error with request: {e}")),
    };

    match route {
        Route::Root => Reply::text(200, BANNER),
        Route::Base { .. } => {
            let path = url.split('?').next().unwrap_or(url).trim_end_matches('/');
            Reply::text(303, "See Other").with_header("Location", format!("{path}/info.json"))
        }
        Route::Info { prefix, identifier } => match service.info(&identifier, &prefix) {
            Ok(doc) => match serde_json::to_vec(&doc) {
                Ok(body) => Reply::new(200, info_content_type(accept), body)
                    .with_header("Access-Control-Allow-Origin", "*"),
                Err(e) => {
                    log::error!("failed to encode info for {identifier}: {e}");
                    Reply::text(500, "failed to encode info document")
                }
            },
            Err(e) => error_reply(&e),
        },
        Route::Image { request, .. } => match service.render_request(url, &request) {
            Ok(rendered) => Reply::new(200, &rendered.entry.content_type, rendered.entry.bytes)
                .with_header("Link", format!("<{COMPLIANCE_LEVEL_URI}>;rel=\"profile\"")),
            Err(e) => error_reply(&e),
        },
    }
}

fn error_reply(err: &ServiceError) -> Reply {
    let status = status_for(err);
    if status >= 500 {
        log::error!("{err}");
    }
    Reply::text(status, format!("Error with request: {err}"))
}

/// Bind `address` and serve until the process exits.
pub fn run<B: ImageBackend + 'static>(
    service: Arc<ImageService<B>>,
    address: &str,
    workers: usize,
) -> Result<(), ServeError> {
    let server = Server::http(address).map_err(|e| ServeError::Bind {
        address: address.to_string(),
        message: e.to_string(),
    })?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("iiif-worker-{i}"))
        .build()?;

    log::info!("listening on http://{address} ({workers} workers)");

    for request in server.incoming_requests() {
        let service = Arc::clone(&service);
        pool.spawn(move || handle(request, &service));
    }
    Ok(())
}

fn handle<B: ImageBackend>(request: Request, service: &ImageService<B>) {
    let started = Instant::now();
    let method = request.method().clone();
    let url = request.url().to_string();

    let reply = match method {
        Method::Get | Method::Head => {
            let accept = header_value(&request, "Accept");
            respond(service, &url, accept.as_deref())
        }
        _ => Reply::text(405, "405 Method Not Allowed").with_header("Allow", "GET, HEAD"),
    };
    let status = reply.status;

    if let Err(e) = request.respond(reply.into_response()) {
        log::warn!("{method} {url}: failed to send response: {e}");
    }
    log::info!("{method} {url} {status} {:.1?}", started.elapsed());
}

fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.to_string())
}
