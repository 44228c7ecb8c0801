use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct OnlineUsersQuery {
    /// 续传游标，0 或缺省表示从头开始
    #[serde(default)]
    pub cursor: u64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct OnlineUsersResponse {
    pub user_ids: Vec<i64>,
    /// 用户ID -> "Country|City" 或 "Country"
    pub locations: HashMap<i64, String>,
    /// 0 表示没有更多页
    pub next_cursor: u64,
    /// 在线总人数，仅供展示，不与本页结果保证一致
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    pub country: String,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateLocationResponse {
    pub success: bool,
    pub message: String,
}
