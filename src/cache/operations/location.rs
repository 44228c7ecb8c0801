use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::cache::keys::presence_keys;
use crate::cache::models::presence::CachedLocation;
use crate::cache::store::{AppCache, CacheError};

/// IP -> 粗粒度位置的外部解析器。解析失败返回空串，不报错。
#[async_trait]
pub trait IpLocator: Send + Sync {
    /// 返回 (country, city)，无法解析时两者皆空
    async fn find(&self, ip: &str) -> (String, String);
}

/// 位置缓存操作。位置与在线状态的 TTL 互相独立。
pub struct LocationOperations {
    store: Arc<dyn AppCache>,
    /// 位置键的过期时间（秒）
    location_expire_secs: u64,
}

impl LocationOperations {
    pub fn new(store: Arc<dyn AppCache>, location_expire_secs: u64) -> Self {
        Self {
            store,
            location_expire_secs,
        }
    }

    /// 只在没有缓存位置时才调用外部解析器并写入。
    /// 幂等且先写者胜：并发调用最多多做几次解析，
    /// 一旦有一次写入成功，后续调用直接跳过。
    pub async fn record_if_absent(&self, user_id: i64, client_ip: &str, locator: &dyn IpLocator) {
        if client_ip.is_empty() {
            return;
        }

        let key = presence_keys::user_location_key(user_id);
        match self.store.exists(&key).await {
            Ok(true) => return, // 已有缓存位置，跳过昂贵的 IP 解析
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("failed to check cached location for user {}: {}", user_id, e);
                return;
            }
        }

        let (country, city) = locator.find(client_ip).await;
        if country.is_empty() {
            return;
        }

        let location = CachedLocation::new(country, Some(city));
        if let Err(e) = self
            .store
            .set(&key, &location.to_cache_value(), self.location_expire_secs)
            .await
        {
            tracing::warn!("failed to cache location for user {}: {}", user_id, e);
        }
    }

    /// 无条件覆盖用户位置，供位置上报接口使用
    pub async fn update_location(
        &self,
        user_id: i64,
        location: &CachedLocation,
    ) -> Result<(), CacheError> {
        self.store
            .set(
                &presence_keys::user_location_key(user_id),
                &location.to_cache_value(),
                self.location_expire_secs,
            )
            .await
    }

    pub async fn get_location(&self, user_id: i64) -> Result<Option<CachedLocation>, CacheError> {
        let raw = self
            .store
            .get(&presence_keys::user_location_key(user_id))
            .await?;
        Ok(raw.as_deref().and_then(CachedLocation::parse))
    }
}

#[derive(Debug, Deserialize)]
struct GeoIpResponse {
    #[serde(default)]
    country: String,
    #[serde(default)]
    city: String,
}

/// 通过 HTTP geo-ip 服务解析位置
pub struct HttpIpLocator {
    base_url: String,
    http: reqwest::Client,
}

impl HttpIpLocator {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IpLocator for HttpIpLocator {
    async fn find(&self, ip: &str) -> (String, String) {
        let url = format!("{}/{}", self.base_url, ip);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("geoip lookup failed for {}: {}", ip, e);
                return (String::new(), String::new());
            }
        };
        if !response.status().is_success() {
            tracing::warn!("geoip lookup for {} returned status {}", ip, response.status());
            return (String::new(), String::new());
        }
        match response.json::<GeoIpResponse>().await {
            Ok(geo) => (geo.country, geo.city),
            Err(e) => {
                tracing::warn!("geoip response for {} not parseable: {}", ip, e);
                (String::new(), String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::memory::MemoryAppCache;

    /// 每次调用返回不同答案的解析器，用来验证先写者胜
    struct FlippingLocator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IpLocator for FlippingLocator {
        async fn find(&self, _ip: &str) -> (String, String) {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                ("France".into(), "Paris".into())
            } else {
                ("Germany".into(), "Berlin".into())
            }
        }
    }

    struct UnresolvableLocator;

    #[async_trait]
    impl IpLocator for UnresolvableLocator {
        async fn find(&self, _ip: &str) -> (String, String) {
            (String::new(), String::new())
        }
    }

    #[tokio::test]
    async fn test_record_if_absent_first_value_wins() {
        let store = Arc::new(MemoryAppCache::new());
        let ops = LocationOperations::new(store, 3600);
        let locator = FlippingLocator {
            calls: AtomicUsize::new(0),
        };

        ops.record_if_absent(1, "203.0.113.7", &locator).await;
        ops.record_if_absent(1, "203.0.113.7", &locator).await;

        let location = ops.get_location(1).await.unwrap().unwrap();
        assert_eq!(location.country, "France");
        assert_eq!(location.city.as_deref(), Some("Paris"));
        // 第二次调用在 exists 检查处短路，解析器只跑了一次
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_record_if_absent_skips_empty_ip_and_unresolvable() {
        let store = Arc::new(MemoryAppCache::new());
        let ops = LocationOperations::new(store, 3600);

        ops.record_if_absent(2, "", &UnresolvableLocator).await;
        assert!(ops.get_location(2).await.unwrap().is_none());

        ops.record_if_absent(2, "198.51.100.4", &UnresolvableLocator).await;
        assert!(ops.get_location(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_location_overwrites() {
        let store = Arc::new(MemoryAppCache::new());
        let ops = LocationOperations::new(store, 3600);

        ops.update_location(3, &CachedLocation::new("Japan", None))
            .await
            .unwrap();
        ops.update_location(3, &CachedLocation::new("Japan", Some("Tokyo".into())))
            .await
            .unwrap();

        let location = ops.get_location(3).await.unwrap().unwrap();
        assert_eq!(location.display_place(), "Tokyo");
    }
}
