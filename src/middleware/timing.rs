use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info, warn};

pub const RESPONSE_TIME_HEADER: HeaderName = HeaderName::from_static("x-response-time-us");
pub const SERVER_TIMING_HEADER: HeaderName = HeaderName::from_static("server-timing");

/// Times each request through the relay. The elapsed time is reported back
/// in microseconds and as a `Server-Timing` entry, then logged at a level
/// picked from the response status.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let started = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = started.elapsed();

    stamp_elapsed(response.headers_mut(), elapsed);
    log_request(&response, &method, &path, elapsed);

    response
}

fn stamp_elapsed(headers: &mut HeaderMap, elapsed: Duration) {
    let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    headers.insert(RESPONSE_TIME_HEADER, HeaderValue::from(micros));

    let millis = elapsed.as_secs_f64() * 1000.0;
    if let Ok(value) = HeaderValue::from_str(&format!("relay;dur={millis:.3}")) {
        headers.insert(SERVER_TIMING_HEADER, value);
    }
}

fn log_request(response: &Response, method: &Method, path: &str, elapsed: Duration) {
    let status = response.status();
    let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

    if status.is_server_error() {
        warn!(status = status.as_u16(), %method, path, us, "request failed");
    } else if status.is_client_error() {
        info!(status = status.as_u16(), %method, path, us, "request rejected");
    } else {
        debug!(status = status.as_u16(), %method, path, us, "request handled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_time_is_written_in_both_formats() {
        let mut headers = HeaderMap::new();
        stamp_elapsed(&mut headers, Duration::from_micros(1_500));

        assert_eq!(headers[&RESPONSE_TIME_HEADER], "1500");
        assert_eq!(headers[&SERVER_TIMING_HEADER], "relay;dur=1.500");
    }
}
