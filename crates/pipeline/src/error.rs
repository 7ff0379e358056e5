//! 파이프라인 에러 타입
//!
//! [`PipelineError`]는 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<PipelineError> for LogpondError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use logpond_core::error::{CacheError, LogpondError, StorageError};

/// 파이프라인 도메인 에러
///
/// 규칙 로딩, 큐 소비, 스토리지/캐시 연동 등 파이프라인 내부의
/// 모든 에러 상황을 포괄합니다. 개별 유닛 파싱 실패는 에러가 아니라
/// `unparsed` 레코드로 처리됩니다.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 규칙 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패
    #[error("rule validation error: rule '{rule_name}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 이름
        rule_name: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 큐 디렉토리 접근 실패
    #[error("queue error: {path}: {reason}")]
    Queue {
        /// 큐 디렉토리 또는 파일 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 캐시 에러
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<PipelineError> for LogpondError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Storage(e) => LogpondError::Storage(e),
            PipelineError::Cache(e) => LogpondError::Cache(e),
            PipelineError::Io(e) => LogpondError::Io(e),
            other => LogpondError::Other(other.to_string()),
        }
    }
}
