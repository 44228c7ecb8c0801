use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 一页在线用户的枚举结果。next_cursor 为 0 表示已扫描完整个键空间。
/// 每次调用临时生成，从不落盘。
#[derive(Debug, Clone, Serialize)]
pub struct OnlineUsersPage {
    pub user_ids: Vec<i64>,
    /// 用户ID -> 位置缓存原始值，没有缓存位置的用户不出现在这里
    pub locations: HashMap<i64, String>,
    pub next_cursor: u64,
}

/// 用户的粗粒度位置，缓存值格式为 "Country|City" 或 "Country"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLocation {
    pub country: String,
    pub city: Option<String>,
}

impl CachedLocation {
    pub fn new(country: impl Into<String>, city: Option<String>) -> Self {
        Self {
            country: country.into(),
            city: city.filter(|c| !c.is_empty()),
        }
    }

    /// 解析缓存值，空串或缺少国家时返回 None
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(2, '|');
        let country = parts.next().unwrap_or_default();
        if country.is_empty() {
            return None;
        }
        let city = parts.next().filter(|c| !c.is_empty()).map(str::to_string);
        Some(Self {
            country: country.to_string(),
            city,
        })
    }

    /// 编码为缓存值
    pub fn to_cache_value(&self) -> String {
        match &self.city {
            Some(city) => format!("{}|{}", self.country, city),
            None => self.country.clone(),
        }
    }

    /// 展示用的地名，优先城市
    pub fn display_place(&self) -> &str {
        self.city.as_deref().unwrap_or(&self.country)
    }
}
