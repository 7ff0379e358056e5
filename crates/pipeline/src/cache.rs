//! Redis dedup 캐시 구현
//!
//! content hash를 `logpond:seen:{hash}` 키로 저장합니다. 조회와 등록은
//! 배치당 한 번의 MGET/MSET 왕복으로 처리합니다.

use std::collections::HashSet;

use redis::aio::ConnectionManager;

use logpond_core::error::CacheError;
use logpond_core::store::DedupCache;

const KEY_PREFIX: &str = "logpond:seen:";

/// Redis 기반 dedup 캐시
///
/// [`ConnectionManager`]는 끊긴 연결을 내부적으로 재접속하므로
/// 호출마다 clone해서 사용합니다.
#[derive(Clone)]
pub struct RedisDedupCache {
    manager: ConnectionManager,
}

impl RedisDedupCache {
    /// Redis URL로 연결을 생성합니다.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        Ok(Self { manager })
    }

    fn key(hash: &str) -> String {
        format!("{KEY_PREFIX}{hash}")
    }
}

impl DedupCache for RedisDedupCache {
    async fn existing(&self, hashes: &[String]) -> Result<HashSet<String>, CacheError> {
        if hashes.is_empty() {
            return Ok(HashSet::new());
        }

        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("MGET");
        for hash in hashes {
            cmd.arg(Self::key(hash));
        }

        let values: Vec<Option<String>> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::CommandFailed(e.to_string()))?;

        Ok(hashes
            .iter()
            .zip(values)
            .filter(|(_, v)| v.is_some())
            .map(|(h, _)| h.clone())
            .collect())
    }

    async fn mark_seen(&self, hashes: &[String]) -> Result<(), CacheError> {
        if hashes.is_empty() {
            return Ok(());
        }

        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("MSET");
        for hash in hashes {
            cmd.arg(Self::key(hash)).arg("1");
        }

        cmd.query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::CommandFailed(e.to_string()))?;

        Ok(())
    }
}

/// 인메모리 dedup 캐시
///
/// Redis 없이 동작하는 테스트/단독 실행용 구현입니다. clone은 같은
/// 집합을 공유합니다.
#[derive(Clone, Default)]
pub struct MemoryDedupCache {
    seen: std::sync::Arc<std::sync::Mutex<HashSet<String>>>,
}

impl MemoryDedupCache {
    /// 빈 캐시를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupCache for MemoryDedupCache {
    async fn existing(&self, hashes: &[String]) -> Result<HashSet<String>, CacheError> {
        let seen = self
            .seen
            .lock()
            .map_err(|e| CacheError::CommandFailed(e.to_string()))?;
        Ok(hashes
            .iter()
            .filter(|h| seen.contains(*h))
            .cloned()
            .collect())
    }

    async fn mark_seen(&self, hashes: &[String]) -> Result<(), CacheError> {
        let mut seen = self
            .seen
            .lock()
            .map_err(|e| CacheError::CommandFailed(e.to_string()))?;
        seen.extend(hashes.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_carries_prefix() {
        assert_eq!(RedisDedupCache::key("abc"), "logpond:seen:abc");
    }

    #[tokio::test]
    async fn memory_cache_round_trip() {
        let cache = MemoryDedupCache::new();
        let hashes = vec!["a".to_owned(), "b".to_owned()];

        let known = cache.existing(&hashes).await.unwrap();
        assert!(known.is_empty());

        cache.mark_seen(&hashes[..1].to_vec()).await.unwrap();
        let known = cache.existing(&hashes).await.unwrap();
        assert!(known.contains("a"));
        assert!(!known.contains("b"));
    }

    #[tokio::test]
    async fn memory_cache_clones_share_state() {
        let cache = MemoryDedupCache::new();
        let other = cache.clone();
        cache.mark_seen(&["a".to_owned()]).await.unwrap();
        let known = other.existing(&["a".to_owned()]).await.unwrap();
        assert!(known.contains("a"));
    }

    #[tokio::test]
    async fn memory_cache_empty_input() {
        let cache = MemoryDedupCache::new();
        assert!(cache.existing(&[]).await.unwrap().is_empty());
        cache.mark_seen(&[]).await.unwrap();
    }
}
