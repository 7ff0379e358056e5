#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`parser`]: YAML 규칙 기반 파서 (정규식/JSON 매핑, 실패 없는 정규화)
//! - [`queue`]: 큐 디렉토리 소비자 (파일당 트랜잭션, 독성 파일 격리)
//! - [`dedup`]: content hash 기반 중복 제거
//! - [`storage`]: SQLite 레코드 스토어
//! - [`cache`]: Redis dedup 캐시
//! - [`analyzer`]: 저장된 레코드에 대한 탐지 규칙 평가
//! - [`config`]: 소비자 설정
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! queue/pending -> QueueConsumer -> LogParser -> Deduplicator -> SqliteStore
//!       |               |              |             |              |
//!   capture files   per-file tx    YAML rules   Redis cache    unique hash_id
//! ```

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod parser;
pub mod queue;
pub mod storage;

// --- 주요 타입 re-export ---

// 파서
pub use parser::{LogParser, ParsingMethod, ParsingRule, RuleBook};

// 큐 소비자
pub use queue::{DrainSummary, QueueConsumer};

// 중복 제거
pub use dedup::{content_hash, Deduplicator};

// 스토리지/캐시
pub use cache::{MemoryDedupCache, RedisDedupCache};
pub use storage::SqliteStore;

// 분석기
pub use analyzer::{AnalysisRule, Analyzer, Finding};

// 설정
pub use config::ConsumerConfig;

// 에러
pub use error::PipelineError;
