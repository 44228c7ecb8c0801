use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::error;

/// 记录服务端错误响应，方便在日志里定位失败的请求
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    if response.status().is_server_error() {
        error!(
            "server error occurred - {} {} -> {}",
            method,
            path,
            response.status()
        );
    }

    response
}
