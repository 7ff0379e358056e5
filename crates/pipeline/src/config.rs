//! 파이프라인 소비자 설정
//!
//! 큐 소비자의 런타임 파라미터입니다. 데몬은 `logpond.toml`의
//! `[queue]` 섹션에서 이 값을 채웁니다.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::PipelineError;

/// 큐 소비자 설정
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// 캡처 파일이 도착하는 디렉토리
    pub pending_dir: PathBuf,
    /// 처리 완료 파일이 이동되는 디렉토리
    pub processed_dir: PathBuf,
    /// 트랜잭션당 레코드 배치 크기
    pub batch_size: usize,
    /// 큐 폴링 간격
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            pending_dir: PathBuf::from("/var/lib/logpond/queue/pending"),
            processed_dir: PathBuf::from("/var/lib/logpond/queue/processed"),
            batch_size: 500,
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl ConsumerConfig {
    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::Config {
                field: "batch_size".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        if self.pending_dir == self.processed_dir {
            return Err(PipelineError::Config {
                field: "processed_dir".to_owned(),
                reason: "must differ from pending_dir".to_owned(),
            });
        }

        if self.poll_interval.is_zero() {
            return Err(PipelineError::Config {
                field: "poll_interval".to_owned(),
                reason: "must be non-zero".to_owned(),
            });
        }

        Ok(())
    }
}
