use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{AppState, utils::Claims};

/// 在每个已认证请求上刷新用户的在线 TTL，并在没有缓存位置时
/// 触发一次 IP 位置解析。
///
/// 写缓存放在独立任务里执行：不拖慢响应，缓存层的任何错误都
/// 只记日志，绝不让父请求失败。
pub async fn record_presence(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(claims) = req.extensions().get::<Claims>() {
        let user_id = claims.uid;
        let client_ip = extract_client_ip(&req);
        let presence = state.presence.clone();
        let location = state.location.clone();
        let locator = state.locator.clone();

        tokio::spawn(async move {
            if let Err(e) = presence.set_presence(user_id).await {
                tracing::warn!("failed to refresh presence for user {}: {}", user_id, e);
            }
            if let Some(ip) = client_ip {
                location.record_if_absent(user_id, &ip, locator.as_ref()).await;
            }
        });
    }

    next.run(req).await
}

/// 从请求头中获取客户端IP，或者使用连接信息中的IP作为默认值
fn extract_client_ip(req: &Request<Body>) -> Option<String> {
    let from_headers = req
        .headers()
        .get("x-real-ip")
        .and_then(|header| header.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|header| header.to_str().ok())
                .and_then(|value| value.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .map(|ip| ip.trim().to_string());

    from_headers.or_else(|| {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string())
    })
}
