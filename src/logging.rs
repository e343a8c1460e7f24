//! Middleware for logging requests and responses.

use axum::{extract::Request, middleware::Next, response::Response};

/// The maximum number of body bytes logged at the `info` level.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If a body is longer than [LOG_BODY_LENGTH_LIMIT] bytes, it is
/// truncated and logged in full at the `debug` level.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let (headers, body_text) = extract_header_and_body_text_from_request(request).await;
    log_request(&headers, &body_text);

    let request = Request::from_parts(headers, body_text.into());
    let response = next.run(request).await;

    let (headers, body_text) = extract_header_and_body_text_from_response(response).await;
    log_response(&headers, &body_text);

    Response::from_parts(headers, body_text.into())
}

async fn extract_header_and_body_text_from_request(
    request: Request,
) -> (axum::http::request::Parts, String) {
    let (headers, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();

    (headers, String::from_utf8_lossy(&body_bytes).to_string())
}

async fn extract_header_and_body_text_from_response(
    response: Response,
) -> (axum::http::response::Parts, String) {
    let (headers, body) = response.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();

    (headers, String::from_utf8_lossy(&body_bytes).to_string())
}

fn log_request(headers: &axum::http::request::Parts, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Received request: {headers:#?}\nbody: {:}...",
            &body[..LOG_BODY_LENGTH_LIMIT]
        );
        tracing::debug!("Full request body: {body:?}");
    } else {
        tracing::info!("Received request: {headers:#?}\nbody: {body:?}");
    }
}

fn log_response(headers: &axum::http::response::Parts, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Sending response: {headers:#?}\nbody: {:}...",
            &body[..LOG_BODY_LENGTH_LIMIT]
        );
        tracing::debug!("Full response body: {body:?}");
    } else {
        tracing::info!("Sending response: {headers:#?}\nbody: {body:?}");
    }
}

#[cfg(test)]
mod logging_middleware_tests {
    use axum::{Router, middleware, routing::post};
    use axum_test::TestServer;

    use super::logging_middleware;

    async fn echo(body: String) -> String {
        body
    }

    #[tokio::test]
    async fn passes_request_and_response_bodies_through() {
        let app = Router::new()
            .route("/echo", post(echo))
            .layer(middleware::from_fn(logging_middleware));
        let server = TestServer::try_new(app).expect("Could not create test server.");

        let response = server.post("/echo").text("hello world").await;

        response.assert_status_ok();
        response.assert_text("hello world");
    }

    #[tokio::test]
    async fn passes_bodies_longer_than_the_log_limit_through() {
        let app = Router::new()
            .route("/echo", post(echo))
            .layer(middleware::from_fn(logging_middleware));
        let server = TestServer::try_new(app).expect("Could not create test server.");

        let long_body = "a".repeat(super::LOG_BODY_LENGTH_LIMIT * 2);
        let response = server.post("/echo").text(long_body.clone()).await;

        response.assert_status_ok();
        response.assert_text(long_body);
    }
}
