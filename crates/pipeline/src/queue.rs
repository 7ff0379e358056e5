//! 큐 소비자
//!
//! 수집기가 pending 디렉토리에 떨어뜨린 캡처 파일을 소비합니다.
//! 파일 하나가 스토리지 트랜잭션 하나에 대응하며, 처리 결과와 무관하게
//! 파일은 정확히 한 번 processed 디렉토리로 이동됩니다. 커밋에
//! 실패한 파일이 큐에 남아 소비자를 반복적으로 쓰러뜨리는 일이
//! 없도록 하기 위한 규칙입니다.
//!
//! # 캡처 파일 형식
//! - JSON envelope: `{"host": "...", "source_type": "...", "logs": [...]}`
//! - NDJSON: 한 줄에 JSON 오브젝트 하나
//! - 일반 텍스트: 한 줄에 로그 유닛 하나

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use logpond_core::store::{DedupCache, RecordStore, RecordWriter};
use logpond_core::types::CimRecord;

use crate::config::ConsumerConfig;
use crate::dedup::Deduplicator;
use crate::error::PipelineError;
use crate::parser::LogParser;

/// 소비 사이클 한 번의 결과 집계
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    /// 커밋까지 성공한 파일 수
    pub files_committed: usize,
    /// 스토리지 실패로 롤백된 파일 수
    pub files_failed: usize,
    /// 커밋된 레코드 수 (중복 제거 이후)
    pub records_committed: usize,
}

/// 캡처 파일에서 추출된 유닛 목록
struct CaptureUnits {
    /// 파일 수준 로그 소스 힌트
    source_hint: Option<String>,
    /// 파일 수준 호스트명 (envelope의 host)
    host: Option<String>,
    /// 원시 유닛들
    units: Vec<String>,
}

/// 큐 소비자
///
/// 제네릭 스토어와 캐시 위에서 동작합니다. 중복 제거기는 선택적이며,
/// 없으면 레코드가 해시 스탬프 없이 저장됩니다.
pub struct QueueConsumer<S, C> {
    parser: LogParser,
    store: S,
    dedup: Option<Deduplicator<C>>,
    config: ConsumerConfig,
}

impl<S, C> QueueConsumer<S, C>
where
    S: RecordStore,
    C: DedupCache,
{
    /// 새 소비자를 생성합니다.
    pub fn new(
        parser: LogParser,
        store: S,
        dedup: Option<Deduplicator<C>>,
        config: ConsumerConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            parser,
            store,
            dedup,
            config,
        })
    }

    /// 취소될 때까지 큐를 주기적으로 소비합니다.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PipelineError> {
        loop {
            match self.process_available().await {
                Ok(summary) if summary.files_committed + summary.files_failed > 0 => {
                    tracing::info!(
                        files_committed = summary.files_committed,
                        files_failed = summary.files_failed,
                        records_committed = summary.records_committed,
                        "queue drain cycle complete"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "queue drain cycle failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("queue consumer shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// pending 디렉토리의 현재 파일들을 한 번 소비합니다.
    ///
    /// 디렉토리 스냅샷은 사이클 시작 시점에 찍히므로, 처리 도중에
    /// 도착한 파일은 다음 사이클에서 처리됩니다.
    pub async fn process_available(&self) -> Result<DrainSummary, PipelineError> {
        tokio::fs::create_dir_all(&self.config.pending_dir)
            .await
            .map_err(|e| PipelineError::Queue {
                path: self.config.pending_dir.display().to_string(),
                reason: format!("failed to create pending dir: {e}"),
            })?;
        tokio::fs::create_dir_all(&self.config.processed_dir)
            .await
            .map_err(|e| PipelineError::Queue {
                path: self.config.processed_dir.display().to_string(),
                reason: format!("failed to create processed dir: {e}"),
            })?;

        let mut paths = self.snapshot_pending().await?;
        paths.sort();

        let mut summary = DrainSummary::default();

        for path in paths {
            match self.process_file(&path).await {
                Ok(committed) => {
                    summary.files_committed += 1;
                    summary.records_committed += committed;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "capture file failed");
                    summary.files_failed += 1;
                }
            }

            self.move_to_processed(&path).await;
        }

        Ok(summary)
    }

    /// pending 디렉토리의 일반 파일 목록을 반환합니다.
    async fn snapshot_pending(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let dir = &self.config.pending_dir;
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| PipelineError::Queue {
                path: dir.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PipelineError::Queue {
                path: dir.display().to_string(),
                reason: format!("failed to read directory entry: {e}"),
            })?
        {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                paths.push(path);
            }
        }

        Ok(paths)
    }

    /// 파일 하나를 파싱하고 하나의 트랜잭션으로 저장합니다.
    ///
    /// 반환값은 커밋된 레코드 수입니다. 스토리지 실패 시 트랜잭션을
    /// 롤백하고 에러를 반환합니다. 파일 이동은 호출자가 담당합니다.
    ///
    /// envelope 파일은 전체를 버퍼링해서 해석하고, line-delimited
    /// 파일은 파일 전체를 메모리에 올리지 않고 줄 단위로 스트리밍하며
    /// 배치 크기에 도달할 때마다 트랜잭션에 추가합니다.
    async fn process_file(&self, path: &Path) -> Result<usize, PipelineError> {
        let read_err = |e: std::io::Error| PipelineError::Queue {
            path: path.display().to_string(),
            reason: format!("failed to read file: {e}"),
        };

        let file = tokio::fs::File::open(path).await.map_err(read_err)?;
        let mut reader = BufReader::new(file);

        // 첫 줄이 파일 형식을 결정합니다.
        let mut first = String::new();
        loop {
            first.clear();
            if reader.read_line(&mut first).await.map_err(read_err)? == 0 {
                break;
            }
            if !first.trim().is_empty() {
                break;
            }
        }

        // 스트리밍 경로로 넘어갈 때 이미 읽어 둔 줄들
        let mut lookahead: Vec<String> = Vec::new();

        let buffered = if first.trim().starts_with('{') {
            match serde_json::from_str::<Value>(first.trim()) {
                // 한 줄에 닫히는 `logs` 배열 오브젝트 -- 파일의 유일한
                // 줄일 때만 envelope입니다. 뒤에 내용이 더 있으면
                // `logs` 키를 가진 NDJSON 유닛일 뿐입니다.
                Ok(Value::Object(map)) if map.get("logs").is_some_and(Value::is_array) => {
                    let mut next = String::new();
                    loop {
                        next.clear();
                        if reader.read_line(&mut next).await.map_err(read_err)? == 0 {
                            break;
                        }
                        if !next.trim().is_empty() {
                            break;
                        }
                    }

                    if next.trim().is_empty() {
                        envelope_capture(&map, path)
                    } else {
                        lookahead.push(first.clone());
                        lookahead.push(next);
                        None
                    }
                }
                // 한 줄에 닫히는 JSON 유닛 -- NDJSON 스트림으로 처리
                Ok(_) => {
                    lookahead.push(first.clone());
                    None
                }
                // 여러 줄에 걸친 envelope 후보 -- 나머지를 버퍼링
                Err(_) => {
                    let mut content = first.clone();
                    reader.read_to_string(&mut content).await.map_err(read_err)?;
                    Some(extract_units(&content, path))
                }
            }
        } else {
            lookahead.push(first.clone());
            None
        };

        let mut writer = self.store.begin().await?;
        let mut fresh: Vec<String> = Vec::new();

        let outcome = match &buffered {
            Some(capture) => self.buffered_batches(&mut writer, capture, &mut fresh).await,
            None => {
                let source_hint = source_hint_from_name(path);
                self.stream_batches(
                    &mut writer,
                    &mut reader,
                    &lookahead,
                    source_hint.as_deref(),
                    &mut fresh,
                )
                .await
                .map_err(|e| match e {
                    StreamError::Read(io) => read_err(io),
                    StreamError::Pipeline(p) => p,
                })
            }
        };

        match outcome {
            Ok(committed) => {
                writer.commit().await?;

                // 해시 등록은 커밋이 확정된 뒤에만. 롤백된 파일의
                // 해시가 캐시에 남으면 재수집된 레코드가 유실됩니다.
                if let Some(dedup) = &self.dedup {
                    dedup.mark_committed(&fresh).await;
                }

                tracing::debug!(
                    path = %path.display(),
                    records = committed,
                    "capture file committed"
                );
                Ok(committed)
            }
            Err(e) => {
                if let Err(rollback_err) = writer.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// 버퍼링된 유닛 목록을 배치 단위로 트랜잭션에 추가합니다.
    async fn buffered_batches(
        &self,
        writer: &mut S::Writer,
        capture: &CaptureUnits,
        fresh: &mut Vec<String>,
    ) -> Result<usize, PipelineError> {
        let mut committed = 0usize;
        for chunk in capture.units.chunks(self.config.batch_size) {
            committed += self
                .flush_batch(
                    writer,
                    chunk,
                    capture.source_hint.as_deref(),
                    capture.host.as_deref(),
                    fresh,
                )
                .await?;
        }
        Ok(committed)
    }

    /// line-delimited 스트림을 배치 단위로 트랜잭션에 추가합니다.
    ///
    /// `initial`은 형식 판별 중에 이미 읽힌 앞줄들입니다.
    async fn stream_batches(
        &self,
        writer: &mut S::Writer,
        reader: &mut BufReader<tokio::fs::File>,
        initial: &[String],
        source_hint: Option<&str>,
        fresh: &mut Vec<String>,
    ) -> Result<usize, StreamError> {
        let mut committed = 0usize;
        let mut units: Vec<String> = Vec::with_capacity(self.config.batch_size);

        for line in initial {
            if !line.trim().is_empty() {
                units.push(line.trim_end_matches(['\r', '\n']).to_owned());
            }
        }

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await.map_err(StreamError::Read)? == 0 {
                break;
            }
            let unit = line.trim_end_matches(['\r', '\n']);
            if unit.trim().is_empty() {
                continue;
            }
            units.push(unit.to_owned());

            if units.len() >= self.config.batch_size {
                committed += self
                    .flush_batch(writer, &units, source_hint, None, fresh)
                    .await
                    .map_err(StreamError::Pipeline)?;
                units.clear();
            }
        }

        if !units.is_empty() {
            committed += self
                .flush_batch(writer, &units, source_hint, None, fresh)
                .await
                .map_err(StreamError::Pipeline)?;
        }

        Ok(committed)
    }

    /// 유닛 배치 하나를 파싱, 중복 제거, 추가합니다.
    ///
    /// 신규로 판정된 레코드의 해시는 `fresh`에 모입니다. 캐시 등록은
    /// 파일 커밋 이후 호출자의 몫입니다.
    async fn flush_batch(
        &self,
        writer: &mut S::Writer,
        units: &[String],
        source_hint: Option<&str>,
        host: Option<&str>,
        fresh: &mut Vec<String>,
    ) -> Result<usize, PipelineError> {
        let mut batch: Vec<CimRecord> = units
            .iter()
            .map(|unit| {
                let mut record = self.parser.parse(unit, source_hint);
                if record.hostname.is_none() {
                    record.hostname = host.map(str::to_owned);
                }
                record
            })
            .collect();

        if let Some(dedup) = &self.dedup {
            batch = dedup.filter_new(batch).await;
            fresh.extend(batch.iter().filter_map(|r| r.hash_id.clone()));
        }

        if batch.is_empty() {
            return Ok(0);
        }

        writer.append(&batch).await?;
        Ok(batch.len())
    }

    /// 파일을 processed 디렉토리로 이동합니다.
    ///
    /// 이동 실패는 로그만 남깁니다. 파일이 pending에 남으면 다음
    /// 사이클에서 다시 처리되지만, hash_id unique 제약이 중복 저장을
    /// 막습니다.
    async fn move_to_processed(&self, path: &Path) {
        let Some(file_name) = path.file_name() else {
            return;
        };
        let dest = self.config.processed_dir.join(file_name);

        if let Err(e) = tokio::fs::rename(path, &dest).await {
            tracing::error!(
                from = %path.display(),
                to = %dest.display(),
                error = %e,
                "failed to move capture file to processed"
            );
        }
    }
}

/// 스트리밍 소비 중의 에러 구분
///
/// 읽기 에러는 파일 경로를 붙여 큐 에러로 변환해야 하므로 파이프라인
/// 에러와 분리해서 전달합니다.
enum StreamError {
    Read(std::io::Error),
    Pipeline(PipelineError),
}

/// JSON envelope 오브젝트에서 유닛을 추출합니다.
///
/// `logs` 배열이 없으면 envelope이 아닙니다.
fn envelope_capture(map: &serde_json::Map<String, Value>, path: &Path) -> Option<CaptureUnits> {
    let Some(Value::Array(logs)) = map.get("logs") else {
        return None;
    };

    let source_hint = map
        .get("source_type")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let host = map.get("host").and_then(Value::as_str).map(str::to_owned);

    let mut units = Vec::with_capacity(logs.len());
    for entry in logs {
        match entry {
            Value::String(line) => units.push(line.clone()),
            Value::Object(_) => units.push(entry.to_string()),
            other => {
                tracing::warn!(
                    path = %path.display(),
                    entry = %other,
                    "skipping non-loggable envelope entry"
                );
            }
        }
    }

    Some(CaptureUnits {
        source_hint,
        host,
        units,
    })
}

/// 캡처 파일 내용에서 원시 유닛을 추출합니다.
///
/// 전체가 JSON envelope이면 `logs` 배열의 엔트리가 유닛이 됩니다.
/// 그 외에는 줄 단위로 해석합니다 (NDJSON 포함). 어떤 형식으로도
/// 해석되지 않는 내용은 텍스트 줄로 남아 `unparsed` 레코드가 되며,
/// 버려지지 않습니다.
fn extract_units(content: &str, path: &Path) -> CaptureUnits {
    if content.trim_start().starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content) {
            if let Some(capture) = envelope_capture(&map, path) {
                return capture;
            }
        }
    }

    CaptureUnits {
        source_hint: source_hint_from_name(path),
        host: None,
        units: content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .collect(),
    }
}

/// 파일명에서 로그 소스 힌트를 추출합니다.
///
/// 수집기의 파일명 규약은 `{host}_{source}_{timestamp}`입니다.
fn source_hint_from_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let mut tokens = stem.split('_');
    tokens.next()?;
    tokens.next().map(str::to_owned)
}
