//! 测试用的内存键值存储。
//!
//! 游标语义模仿 Redis SCAN：游标 0 是起点/终点哨兵，非零游标
//! 对应"从某个键之后继续"，因此遍历期间的并发插入和过期删除
//! 不会导致同一个键在一次完整遍历内出现两次。

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::store::{AppCache, CacheError};

#[derive(Default)]
struct MemoryInner {
    /// 键 -> (值, 过期时刻)
    entries: BTreeMap<String, (String, Option<Instant>)>,
    /// 未完成扫描的续传点：游标 -> 上一页最后检查过的键
    cursors: HashMap<u64, String>,
    next_cursor: u64,
}

impl MemoryInner {
    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.entries
            .retain(|_, (_, expires)| expires.map_or(true, |at| at > now));
    }
}

#[derive(Default)]
pub struct MemoryAppCache {
    inner: Mutex<MemoryInner>,
}

impl MemoryAppCache {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 只支持 "prefix*" 和字面量两种模式，够测试使用
fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl AppCache for MemoryAppCache {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;
        let expires = (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs));
        inner.entries.insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        Ok(inner.entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        Ok(inner.entries.contains_key(key))
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count_hint: usize,
    ) -> Result<(Vec<String>, u64), CacheError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();

        let resume_after = if cursor == 0 {
            None
        } else {
            inner.cursors.remove(&cursor)
        };
        let remaining: Vec<String> = match &resume_after {
            None => inner.entries.keys().cloned().collect(),
            Some(last) => inner
                .entries
                .range::<String, _>((Bound::Excluded(last.clone()), Bound::Unbounded))
                .map(|(key, _)| key.clone())
                .collect(),
        };

        let mut matched = Vec::new();
        let mut last_checked = None;
        let mut scanned = 0usize;
        let mut exhausted = true;
        for key in remaining {
            if scanned >= count_hint {
                exhausted = false;
                break;
            }
            scanned += 1;
            if key_matches(pattern, &key) {
                matched.push(key.clone());
            }
            last_checked = Some(key);
        }

        let next_cursor = match (exhausted, last_checked) {
            (false, Some(last)) => {
                inner.next_cursor += 1;
                let token = inner.next_cursor;
                inner.cursors.insert(token, last);
                token
            }
            _ => 0,
        };

        Ok((matched, next_cursor))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        Ok(keys
            .iter()
            .map(|key| inner.entries.get(key).map(|(value, _)| value.clone()))
            .collect())
    }
}

/// 模拟后端不可用的存储，所有操作都返回错误
pub struct UnavailableAppCache;

#[async_trait]
impl AppCache for UnavailableAppCache {
    async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("store offline".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("store offline".into()))
    }

    async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("store offline".into()))
    }

    async fn scan(
        &self,
        _cursor: u64,
        _pattern: &str,
        _count_hint: usize,
    ) -> Result<(Vec<String>, u64), CacheError> {
        Err(CacheError::Unavailable("store offline".into()))
    }

    async fn mget(&self, _keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        Err(CacheError::Unavailable("store offline".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_pages_cover_all_keys() {
        let cache = MemoryAppCache::new();
        for i in 0..10 {
            cache.set(&format!("k:{:02}", i), "1", 60).await.unwrap();
        }

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let (keys, next) = cache.scan(cursor, "k:*", 3).await.unwrap();
            seen.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 10);
    }

    #[tokio::test]
    async fn test_expired_keys_disappear() {
        let cache = MemoryAppCache::new();
        cache.set("gone", "1", 1).await.unwrap();
        assert!(cache.exists("gone").await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!cache.exists("gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_mget_reports_missing_as_none() {
        let cache = MemoryAppCache::new();
        cache.set("a", "1", 60).await.unwrap();
        let values = cache
            .mget(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("1".to_string()), None]);
    }
}
