//! 설정 관리 — logpond.toml 파싱 및 런타임 설정
//!
//! [`LogpondConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGPOND_QUEUE_BATCH_SIZE=500` 형식)
//! 3. 설정 파일 (`logpond.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logpond_core::error::LogpondError> {
//! use logpond_core::config::LogpondConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogpondConfig::load("logpond.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogpondConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogpondError};

/// Logpond 통합 설정
///
/// `logpond.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogpondConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 큐 소비자 설정
    #[serde(default)]
    pub queue: QueueConfig,
    /// 파서 설정
    #[serde(default)]
    pub parser: ParserConfig,
    /// 스토리지 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 분석 설정
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl LogpondConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogpondError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogpondError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogpondError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogpondError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogpondError> {
        toml::from_str(toml_str).map_err(|e| {
            LogpondError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGPOND_{SECTION}_{FIELD}`
    /// 예: `LOGPOND_STORAGE_REDIS_URL=redis://cache:6379`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGPOND_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGPOND_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "LOGPOND_GENERAL_DATA_DIR");
        override_string(&mut self.general.lock_file, "LOGPOND_GENERAL_LOCK_FILE");

        // Queue
        override_string(&mut self.queue.pending_dir, "LOGPOND_QUEUE_PENDING_DIR");
        override_string(&mut self.queue.processed_dir, "LOGPOND_QUEUE_PROCESSED_DIR");
        override_usize(&mut self.queue.batch_size, "LOGPOND_QUEUE_BATCH_SIZE");
        override_u64(
            &mut self.queue.poll_interval_secs,
            "LOGPOND_QUEUE_POLL_INTERVAL_SECS",
        );

        // Parser
        override_string(&mut self.parser.rules_path, "LOGPOND_PARSER_RULES_PATH");

        // Storage
        override_string(&mut self.storage.database_url, "LOGPOND_STORAGE_DATABASE_URL");
        override_string(&mut self.storage.redis_url, "LOGPOND_STORAGE_REDIS_URL");
        override_bool(
            &mut self.storage.dedup_enabled,
            "LOGPOND_STORAGE_DEDUP_ENABLED",
        );

        // Analysis
        override_bool(&mut self.analysis.enabled, "LOGPOND_ANALYSIS_ENABLED");
        override_string(&mut self.analysis.rules_path, "LOGPOND_ANALYSIS_RULES_PATH");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogpondError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.queue.batch_size == 0 || self.queue.batch_size > 100_000 {
            return Err(ConfigError::InvalidValue {
                field: "queue.batch_size".to_owned(),
                reason: "must be between 1 and 100000".to_owned(),
            }
            .into());
        }

        if self.queue.poll_interval_secs == 0 || self.queue.poll_interval_secs > 3600 {
            return Err(ConfigError::InvalidValue {
                field: "queue.poll_interval_secs".to_owned(),
                reason: "must be between 1 and 3600".to_owned(),
            }
            .into());
        }

        if self.queue.pending_dir == self.queue.processed_dir {
            return Err(ConfigError::InvalidValue {
                field: "queue.processed_dir".to_owned(),
                reason: "must differ from pending_dir".to_owned(),
            }
            .into());
        }

        if self.parser.rules_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "parser.rules_path".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.analysis.enabled && self.analysis.rules_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "analysis.rules_path".to_owned(),
                reason: "must not be empty when analysis is enabled".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// 실행 락 파일 경로
    pub lock_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/logpond".to_owned(),
            lock_file: "/var/run/logpond.lock".to_owned(),
        }
    }
}

/// 큐 소비자 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 수집기가 캡처 파일을 떨어뜨리는 디렉토리
    pub pending_dir: String,
    /// 처리 완료된 파일이 이동되는 디렉토리
    pub processed_dir: String,
    /// 트랜잭션당 레코드 배치 크기
    pub batch_size: usize,
    /// 큐 폴링 간격 (초)
    pub poll_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pending_dir: "/var/lib/logpond/queue/pending".to_owned(),
            processed_dir: "/var/lib/logpond/queue/processed".to_owned(),
            batch_size: 500,
            poll_interval_secs: 10,
        }
    }
}

/// 파서 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// 파싱 규칙 YAML 파일 경로
    pub rules_path: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            rules_path: "/etc/logpond/parsing_rules.yml".to_owned(),
        }
    }
}

/// 스토리지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite 연결 문자열
    pub database_url: String,
    /// Redis 연결 문자열 (dedup 캐시)
    pub redis_url: String,
    /// 중복 제거 활성화 여부
    pub dedup_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:///var/lib/logpond/logpond.db".to_owned(),
            redis_url: "redis://localhost:6379".to_owned(),
            dedup_enabled: true,
        }
    }
}

/// 분석 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 분석 규칙 YAML 파일 경로
    pub rules_path: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules_path: "/etc/logpond/analysis_rules.yml".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
