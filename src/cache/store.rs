use std::sync::Arc;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// 键值存储契约：带过期时间的写入、存在性检查、游标扫描与批量读取。
/// 在线状态、位置缓存和通知去重标记都只通过这个接口访问外部缓存。
#[async_trait]
pub trait AppCache: Send + Sync {
    /// 写入键值并设置过期时间（秒），过期后键自动消失
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// 按模式游标扫描键空间。游标 0 同时是起点和终点哨兵；
    /// 返回的游标相对哈希空间稳定，并发增删不会导致一次完整
    /// 遍历内重复返回同一个键。
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count_hint: usize,
    ) -> Result<(Vec<String>, u64), CacheError>;

    /// 批量读取，缺失的键对应 None
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError>;
}

/// 基于 Redis 的实现
pub struct RedisAppCache {
    client: Arc<RedisClient>,
}

impl RedisAppCache {
    pub fn new(client: Arc<RedisClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AppCache for RedisAppCache {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Option<String> = conn.get(key).await?;
        Ok(result)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count_hint: usize,
    ) -> Result<(Vec<String>, u64), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count_hint)
            .query_async(&mut conn)
            .await?;
        Ok((keys, next_cursor))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let values: Vec<Option<String>> = conn.mget(keys).await?;
        Ok(values)
    }
}
