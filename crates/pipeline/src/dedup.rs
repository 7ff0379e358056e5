//! content hash 기반 중복 제거
//!
//! 레코드의 정규화된 내용으로 SHA-256 해시를 계산하고, 캐시에 이미
//! 등록된 해시를 가진 레코드를 배치에서 걸러냅니다. 해시 등록은
//! 스토리지 커밋이 확정된 뒤 [`Deduplicator::mark_committed`]로만
//! 수행됩니다. 롤백된 파일의 해시가 캐시에 남으면 그 레코드는 영영
//! 저장되지 못하기 때문입니다. 캐시 장애 시에는 전 배치를 신규로
//! 간주하고 계속 진행합니다. 중복 삽입은 스토리지의 unique 제약이
//! 최종 방어선입니다.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use logpond_core::store::DedupCache;
use logpond_core::types::{CimRecord, HASH_TIMESTAMP_FORMAT};

/// 레코드의 content hash를 계산합니다.
///
/// canonical 필드를 `key=value` 줄로 직렬화한 뒤 정렬하여 해시합니다.
/// `raw_message`와 `hash_id`는 제외됩니다. 같은 이벤트가 소스 표기만
/// 다르게 두 번 수집되어도 같은 해시가 나옵니다.
pub fn content_hash(record: &CimRecord) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!(
        "timestamp={}",
        record.timestamp.format(HASH_TIMESTAMP_FORMAT)
    ));
    lines.push(format!("log_source={}", record.log_source));
    lines.push(format!("action={}", record.action));

    let mut push_opt = |key: &str, value: Option<&str>| {
        if let Some(v) = value {
            lines.push(format!("{key}={v}"));
        }
    };

    push_opt("hostname", record.hostname.as_deref());
    push_opt("process_name", record.process_name.as_deref());
    push_opt("status", record.status.as_deref());
    push_opt("user", record.user.as_deref());
    push_opt("src_ip", record.src_ip.as_deref());
    push_opt("dest_ip", record.dest_ip.as_deref());
    push_opt("command", record.command.as_deref());
    push_opt("object", record.object.as_deref());
    push_opt("message", record.message.as_deref());

    if let Some(pid) = record.pid {
        lines.push(format!("pid={pid}"));
    }
    if let Some(uid) = record.uid {
        lines.push(format!("uid={uid}"));
    }
    if let Some(gid) = record.gid {
        lines.push(format!("gid={gid}"));
    }
    if let Some(port) = record.src_port {
        lines.push(format!("src_port={port}"));
    }
    if let Some(port) = record.dest_port {
        lines.push(format!("dest_port={port}"));
    }

    for (key, value) in &record.fields {
        lines.push(format!("{key}={value}"));
    }

    lines.sort_unstable();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }

    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// 배치 단위 중복 제거기
pub struct Deduplicator<C> {
    cache: C,
}

impl<C: DedupCache> Deduplicator<C> {
    /// 캐시 구현으로 새 중복 제거기를 생성합니다.
    pub fn new(cache: C) -> Self {
        Self { cache }
    }

    /// 배치에서 신규 레코드만 남깁니다.
    ///
    /// 각 레코드에 `hash_id`를 스탬프하고, 캐시 왕복 한 번으로 기존
    /// 해시를 조회합니다. 배치 내부 중복은 먼저 온 레코드가 남습니다.
    /// 캐시 등록은 하지 않습니다. 남은 레코드가 스토리지에 커밋된
    /// 뒤에 호출자가 [`mark_committed`](Self::mark_committed)로
    /// 등록해야 합니다.
    pub async fn filter_new(&self, records: Vec<CimRecord>) -> Vec<CimRecord> {
        if records.is_empty() {
            return records;
        }

        let mut stamped: Vec<CimRecord> = records
            .into_iter()
            .map(|mut record| {
                record.hash_id = Some(content_hash(&record));
                record
            })
            .collect();

        let hashes: Vec<String> = stamped
            .iter()
            .filter_map(|r| r.hash_id.clone())
            .collect();

        let known = match self.cache.existing(&hashes).await {
            Ok(known) => known,
            Err(e) => {
                tracing::warn!(error = %e, "dedup cache lookup failed, treating batch as new");
                HashSet::new()
            }
        };

        let mut seen_in_batch: HashSet<String> = HashSet::new();
        stamped.retain(|record| {
            let Some(hash) = record.hash_id.as_deref() else {
                return true;
            };
            if known.contains(hash) {
                return false;
            }
            seen_in_batch.insert(hash.to_owned())
        });

        stamped
    }

    /// 커밋이 확정된 해시들을 캐시에 등록합니다.
    ///
    /// 캐시 등록 실패는 경고만 남깁니다. 다음 수집에서 같은 레코드가
    /// 다시 통과하더라도 스토리지의 unique 제약이 중복을 막습니다.
    pub async fn mark_committed(&self, hashes: &[String]) {
        if hashes.is_empty() {
            return;
        }
        if let Err(e) = self.cache.mark_seen(hashes).await {
            tracing::warn!(error = %e, "dedup cache registration failed");
        }
    }
}
