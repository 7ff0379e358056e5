//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 모든 모듈이 공유하는 데이터 구조를 정의합니다.
//! 파서가 생성하고 스토리지가 저장하는 정규화 레코드(CIM 스키마)가 중심입니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 정규화 레코드의 canonical 필드 이름 목록
///
/// 분석 규칙의 필터 키 검증과 content hash 계산이 이 목록을 기준으로 합니다.
/// `raw_message`와 `hash_id`는 스키마에 있지만 해시 대상이 아닙니다.
pub const CANONICAL_FIELDS: &[&str] = &[
    "timestamp",
    "hostname",
    "log_source",
    "process_name",
    "pid",
    "uid",
    "gid",
    "action",
    "status",
    "user",
    "src_ip",
    "dest_ip",
    "src_port",
    "dest_port",
    "command",
    "object",
    "message",
    "raw_message",
];

/// content hash 계산 시 사용하는 타임스탬프 고정 표현
///
/// 소스 쪽 표기 차이(공백, 자릿수)가 해시에 영향을 주지 않도록
/// 항상 이 포맷으로 정규화합니다.
pub const HASH_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// 레코드 액션 태그
///
/// 로그가 나타내는 행위의 결과를 분류합니다. 파싱 규칙이 임의의 값을
/// 공급할 수 있으므로 `Other` 변형을 둡니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Action {
    /// 단순 관측 (규칙 매칭됨, 별도 분류 없음)
    #[default]
    Observed,
    /// 허용된 행위
    Allowed,
    /// 거부된 행위
    Denied,
    /// 어떤 규칙에도 매칭되지 않음 — 레코드는 버려지지 않고 이 태그로 저장됩니다
    Unparsed,
    /// 규칙이 공급한 임의 값
    Other(String),
}

impl Action {
    /// 문자열 표현을 반환합니다.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Observed => "observed",
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::Unparsed => "unparsed",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s {
            "observed" => Self::Observed,
            "allowed" => Self::Allowed,
            "denied" => Self::Denied,
            "unparsed" => Self::Unparsed,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Action::from(s.as_str()))
    }
}

/// 정규화 레코드 — canonical 로그 엔트리 스키마 (CIM)
///
/// 다양한 소스(syslog 텍스트, journald JSON 등)에서 수집된 로그를
/// 통합 형식으로 저장합니다. `timestamp`, `log_source`, `raw_message`는
/// 항상 존재하며, 나머지 필드는 소스와 규칙에 따라 채워집니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CimRecord {
    /// 이벤트 시각 (복원 불가 시 처리 시각으로 대체)
    pub timestamp: DateTime<Utc>,
    /// 호스트명
    pub hostname: Option<String>,
    /// 출처 태그 (예: "auth", "syslog", "journald")
    pub log_source: String,
    /// 프로세스명
    pub process_name: Option<String>,
    /// 프로세스 ID
    pub pid: Option<i64>,
    /// 사용자 ID
    pub uid: Option<i64>,
    /// 그룹 ID
    pub gid: Option<i64>,
    /// 액션 태그
    pub action: Action,
    /// 상태 (성공/실패 등, 규칙이 공급)
    pub status: Option<String>,
    /// 관련 사용자명
    pub user: Option<String>,
    /// 출발지 IP
    pub src_ip: Option<String>,
    /// 목적지 IP
    pub dest_ip: Option<String>,
    /// 출발지 포트 (숫자가 아닌 소스 값은 None으로 강제 변환)
    pub src_port: Option<u16>,
    /// 목적지 포트
    pub dest_port: Option<u16>,
    /// 실행된 커맨드
    pub command: Option<String>,
    /// 대상 오브젝트 (파일 경로 등)
    pub object: Option<String>,
    /// 메시지 본문
    pub message: Option<String>,
    /// 원본 유닛 전문 (그대로 보존)
    pub raw_message: String,
    /// 중복 제거용 content hash (dedup 레이어가 스탬프)
    pub hash_id: Option<String>,
    /// canonical 스키마 밖의 규칙 매핑 결과 (key-value 쌍)
    pub fields: Vec<(String, String)>,
}

impl CimRecord {
    /// 최소 필드만 채운 레코드를 생성합니다.
    ///
    /// 파서의 시작점으로, invariant 필드 세 개만 보장합니다.
    pub fn new(
        timestamp: DateTime<Utc>,
        log_source: impl Into<String>,
        raw_message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            hostname: None,
            log_source: log_source.into(),
            process_name: None,
            pid: None,
            uid: None,
            gid: None,
            action: Action::Observed,
            status: None,
            user: None,
            src_ip: None,
            dest_ip: None,
            src_port: None,
            dest_port: None,
            command: None,
            object: None,
            message: None,
            raw_message: raw_message.into(),
            hash_id: None,
            fields: Vec::new(),
        }
    }
}

impl fmt::Display for CimRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {}: {}",
            self.action,
            self.timestamp.format(HASH_TIMESTAMP_FORMAT),
            self.hostname.as_deref().unwrap_or("unknown"),
            self.log_source,
            self.message.as_deref().unwrap_or(&self.raw_message),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn action_default_is_observed() {
        assert_eq!(Action::default(), Action::Observed);
    }

    #[test]
    fn action_roundtrip_known_values() {
        for s in ["observed", "allowed", "denied", "unparsed"] {
            assert_eq!(Action::from(s).as_str(), s);
        }
    }

    #[test]
    fn action_preserves_rule_supplied_value() {
        let action = Action::from("quarantined");
        assert_eq!(action, Action::Other("quarantined".to_owned()));
        assert_eq!(action.as_str(), "quarantined");
    }

    #[test]
    fn action_serializes_as_plain_string() {
        let json = serde_json::to_string(&Action::Unparsed).unwrap();
        assert_eq!(json, "\"unparsed\"");
        let back: Action = serde_json::from_str("\"denied\"").unwrap();
        assert_eq!(back, Action::Denied);
    }

    #[test]
    fn new_record_holds_invariant_fields() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 11, 10, 1, 1).unwrap();
        let record = CimRecord::new(ts, "auth", "raw line");
        assert_eq!(record.log_source, "auth");
        assert_eq!(record.raw_message, "raw line");
        assert_eq!(record.action, Action::Observed);
        assert!(record.hostname.is_none());
        assert!(record.hash_id.is_none());
    }

    #[test]
    fn record_display_uses_unknown_for_missing_hostname() {
        let record = CimRecord::new(Utc::now(), "syslog", "x");
        assert!(record.to_string().contains("unknown"));
    }

    #[test]
    fn record_serde_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        let mut record = CimRecord::new(ts, "journald", "{\"MESSAGE\":\"x\"}");
        record.hostname = Some("dev".to_owned());
        record.src_port = Some(22);
        record.fields.push(("app".to_owned(), "cron.service".to_owned()));
        let json = serde_json::to_string(&record).unwrap();
        let back: CimRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn canonical_fields_cover_required_columns() {
        for required in ["timestamp", "log_source", "raw_message", "dest_port"] {
            assert!(CANONICAL_FIELDS.contains(&required));
        }
    }
}
