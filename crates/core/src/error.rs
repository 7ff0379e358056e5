//! 에러 타입 계층
//!
//! 최상위 [`LogpondError`]와 도메인별 에러를 정의합니다.
//! 각 서브시스템 crate는 자신의 에러를 정의하고 `From` 변환으로
//! 최상위 에러에 합류합니다.

use thiserror::Error;

/// Logpond 최상위 에러
#[derive(Debug, Error)]
pub enum LogpondError {
    /// 설정 로딩/검증 실패
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스토리지 백엔드 실패
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// dedup 캐시 실패
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// I/O 실패
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 서브시스템에서 전파된 기타 에러
    #[error("{0}")]
    Other(String),
}

/// 설정 에러
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// TOML 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 값 검증 실패
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스토리지 에러
///
/// SQL 백엔드의 실패를 감쌉니다. 트랜잭션 커밋/롤백 실패도 여기로
/// 수렴합니다.
#[derive(Debug, Error)]
pub enum StorageError {
    /// 연결 또는 풀 초기화 실패
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// 쿼리 실행 실패
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// 트랜잭션 처리 실패
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// 스키마 초기화 실패
    #[error("schema initialization failed: {0}")]
    SchemaFailed(String),
}

/// dedup 캐시 에러
///
/// 캐시 실패는 파이프라인을 중단시키지 않습니다. 호출 측은 이 에러를
/// 받으면 전 배치를 신규로 간주하고 계속 진행합니다.
#[derive(Debug, Error)]
pub enum CacheError {
    /// 캐시 서버 연결 실패
    #[error("failed to connect to cache: {0}")]
    ConnectionFailed(String),

    /// 캐시 명령 실패
    #[error("cache command failed: {0}")]
    CommandFailed(String),
}
