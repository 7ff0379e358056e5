//! 스토리지/캐시 trait 정의
//!
//! 파이프라인이 의존하는 영속 계층의 경계입니다. 구현체는 pipeline
//! crate에 있으며, 테스트는 인메모리 구현으로 대체할 수 있습니다.

use std::collections::HashSet;

use crate::error::{CacheError, StorageError};
use crate::types::CimRecord;

/// 레코드 조회 조건
///
/// 등호 필터와 메시지 패턴 검색을 지원합니다. 패턴의 `*`는 임의 길이,
/// `?`는 한 글자에 매칭됩니다.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// canonical 필드 등호 조건 (field, value)
    pub filters: Vec<(String, String)>,
    /// log_source 제한
    pub log_source: Option<String>,
    /// message 컬럼 와일드카드 패턴
    pub pattern: Option<String>,
    /// 최대 반환 건수
    pub limit: Option<u32>,
}

impl RecordQuery {
    /// 빈 쿼리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 등호 필터를 추가합니다.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// log_source를 제한합니다.
    pub fn log_source(mut self, source: impl Into<String>) -> Self {
        self.log_source = Some(source.into());
        self
    }

    /// 메시지 패턴을 설정합니다.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// 반환 건수를 제한합니다.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// 레코드 쓰기 트랜잭션
///
/// 하나의 캡처 파일에 대응하는 쓰기 단위입니다. `commit` 전에는
/// 어떤 레코드도 조회에 노출되지 않습니다.
pub trait RecordWriter: Send {
    /// 배치를 트랜잭션에 추가합니다.
    fn append(
        &mut self,
        batch: &[CimRecord],
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// 트랜잭션을 확정합니다.
    fn commit(self) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// 트랜잭션을 버립니다.
    fn rollback(self) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// 레코드 스토어
pub trait RecordStore: Send + Sync {
    /// 이 스토어가 만드는 쓰기 트랜잭션 타입
    type Writer: RecordWriter;

    /// 새 쓰기 트랜잭션을 시작합니다.
    fn begin(&self) -> impl Future<Output = Result<Self::Writer, StorageError>> + Send;

    /// 조건에 맞는 레코드를 조회합니다.
    fn query(
        &self,
        query: &RecordQuery,
    ) -> impl Future<Output = Result<Vec<CimRecord>, StorageError>> + Send;
}

/// dedup 캐시
///
/// content hash의 기존 여부 조회와 등록을 배치 단위로 처리합니다.
pub trait DedupCache: Send + Sync {
    /// 주어진 해시 중 이미 본 것들을 반환합니다.
    fn existing(
        &self,
        hashes: &[String],
    ) -> impl Future<Output = Result<HashSet<String>, CacheError>> + Send;

    /// 해시들을 본 것으로 등록합니다.
    fn mark_seen(
        &self,
        hashes: &[String],
    ) -> impl Future<Output = Result<(), CacheError>> + Send;
}
