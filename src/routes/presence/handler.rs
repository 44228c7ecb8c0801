use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    cache::models::presence::CachedLocation,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{
    OnlineUsersQuery, OnlineUsersResponse, UpdateLocationRequest, UpdateLocationResponse,
};

/// 游标分页列出在线用户及其缓存位置
#[axum::debug_handler]
pub async fn online_users(
    State(state): State<AppState>,
    Query(query): Query<OnlineUsersQuery>,
) -> impl IntoResponse {
    let page = match state
        .presence
        .list_online_users(query.cursor, query.limit)
        .await
    {
        Ok(page) => page,
        Err(e) => {
            tracing::error!("failed to list online users: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "获取在线用户失败".to_string()),
            );
        }
    };

    // 总数取不到时退化为当前页大小，列表本身照常返回
    let total = match state.presence.online_users_count().await {
        Ok(total) => total,
        Err(e) => {
            tracing::warn!("failed to count online users, using fallback: {}", e);
            page.user_ids.len() as i64
        }
    };

    (
        StatusCode::OK,
        success_to_api_response(OnlineUsersResponse {
            user_ids: page.user_ids,
            locations: page.locations,
            next_cursor: page.next_cursor,
            total,
        }),
    )
}

/// 当前用户主动上报位置，直接覆盖缓存
#[axum::debug_handler]
pub async fn update_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateLocationRequest>,
) -> impl IntoResponse {
    if req.country.trim().is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "国家不能为空".to_string()),
        );
    }

    let location = CachedLocation::new(req.country.trim(), req.city.map(|c| c.trim().to_string()));
    if let Err(e) = state.location.update_location(claims.uid, &location).await {
        tracing::error!("failed to update user location: {}", e);
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::INTERNAL_ERROR, "更新位置失败".to_string()),
        );
    }

    (
        StatusCode::OK,
        success_to_api_response(UpdateLocationResponse {
            success: true,
            message: "Location updated successfully".to_string(),
        }),
    )
}
