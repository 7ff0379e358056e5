//! 규칙 기반 로그 파서
//!
//! 원시 로그 유닛(텍스트 한 줄 또는 JSON 오브젝트)을 정규화 레코드로
//! 변환합니다. 파싱은 실패하지 않습니다. 어떤 규칙에도 매칭되지 않는
//! 유닛은 `unparsed` 액션으로 태그되어 원문 그대로 보존됩니다.
//!
//! # 사용 예시
//! ```ignore
//! use logpond_pipeline::parser::{LogParser, RuleBook};
//!
//! let rules = RuleBook::load("parsing_rules.yml").await?;
//! let parser = LogParser::new(rules);
//! let record = parser.parse("Jul 11 10:01:01 web01 sshd[4623]: Failed password ...", Some("auth"));
//! ```

mod loader;
mod mapper;
mod rules;

pub use loader::{CompiledRule, RuleBook};
pub use mapper::{render, set_cim_field};
pub use rules::{ParsingMethod, ParsingRule};

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;

use logpond_core::types::{Action, CimRecord};

/// 유닛 한 개의 최대 허용 크기 (바이트)
const MAX_UNIT_SIZE: usize = 64 * 1024; // 64KB

/// 규칙 기반 파서
///
/// 로드된 [`RuleBook`]을 보유하며 유닛 단위로 적용합니다.
/// 텍스트 유닛에는 BSD syslog 헤더 추출이 규칙 적용 전에 수행되어
/// timestamp, hostname, process_name, pid를 채웁니다.
pub struct LogParser {
    rules: RuleBook,
    header_re: Regex,
    tag_re: Regex,
}

impl LogParser {
    /// 규칙집으로 새 파서를 생성합니다.
    pub fn new(rules: RuleBook) -> Self {
        // 고정 패턴이므로 컴파일은 실패하지 않습니다.
        let header_re = Regex::new(
            r"^(?P<month>[A-Z][a-z]{2})\s+(?P<day>\d{1,2})\s+(?P<time>\d{2}:\d{2}:\d{2})\s+(?P<hostname>[\w\-.]+)\s+(?P<rest>.*)$",
        )
        .unwrap_or_else(|_| unreachable!("header pattern is static"));
        let tag_re = Regex::new(
            r"^(?P<process>[\w./\-]+?)(?:\[(?P<pid>\d+)\])?:\s+(?P<message>.*)$",
        )
        .unwrap_or_else(|_| unreachable!("tag pattern is static"));

        Self {
            rules,
            header_re,
            tag_re,
        }
    }

    /// 규칙집에 대한 참조를 반환합니다.
    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    /// 원시 유닛 하나를 정규화 레코드로 변환합니다.
    ///
    /// `source_hint`는 캡처 파일에서 얻은 로그 소스 태그입니다.
    /// 힌트가 있으면 해당 소스의 규칙만 후보가 됩니다.
    pub fn parse(&self, raw: &str, source_hint: Option<&str>) -> CimRecord {
        self.parse_at(raw, source_hint, Utc::now())
    }

    /// 기준 시각을 지정하여 유닛을 변환합니다.
    ///
    /// 연도 없는 타임스탬프의 연도 추정과 타임스탬프 복원 불가 시의
    /// 대체 시각이 `now`를 기준으로 결정됩니다.
    pub fn parse_at(&self, raw: &str, source_hint: Option<&str>, now: DateTime<Utc>) -> CimRecord {
        let body = raw.trim();
        let source = source_hint.unwrap_or("unknown").to_owned();

        if body.is_empty() || body.len() > MAX_UNIT_SIZE {
            let mut record = CimRecord::new(now, source, raw);
            record.action = Action::Unparsed;
            return record;
        }

        if body.starts_with('{') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
                return self.parse_json_unit(raw, &map, source_hint, now);
            }
        }

        self.parse_text_unit(raw, body, source_hint, now)
    }

    /// 텍스트 유닛을 파싱합니다.
    ///
    /// `raw`는 `raw_message`에 원문 그대로 보존되고, 헤더/규칙 매칭은
    /// 앞뒤 공백을 제거한 `body`에 대해 수행됩니다.
    fn parse_text_unit(
        &self,
        raw: &str,
        body: &str,
        source_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> CimRecord {
        let source = source_hint.unwrap_or("unknown").to_owned();
        let mut record = CimRecord::new(now, source, raw);

        // BSD syslog 헤더 추출 (MMM DD HH:MM:SS hostname rest)
        if let Some(caps) = self.header_re.captures(body) {
            if let Some(ts) = parse_bsd_timestamp(&caps["month"], &caps["day"], &caps["time"], now)
            {
                record.timestamp = ts;
            }
            record.hostname = Some(caps["hostname"].to_owned());

            // 태그 부분에서 process[pid]: message 추출
            if let Some(tag_caps) = self.tag_re.captures(&caps["rest"]) {
                record.process_name = Some(tag_caps["process"].to_owned());
                record.pid = tag_caps
                    .name("pid")
                    .and_then(|m| m.as_str().parse().ok());
                record.message = Some(tag_caps["message"].to_owned());
            } else {
                record.message = Some(caps["rest"].to_owned());
            }
        } else {
            record.message = Some(body.to_owned());
        }

        // 규칙은 헤더를 제외한 메시지 본문에 매칭됩니다. 첫 번째로
        // 매칭되는 정규식 규칙이 이깁니다.
        let match_body = record.message.clone().unwrap_or_else(|| body.to_owned());
        for candidate in self.rules.candidates(source_hint) {
            let Some(regex) = &candidate.regex else {
                continue;
            };
            let Some(caps) = regex.captures(&match_body) else {
                continue;
            };

            for (field, template) in &candidate.rule.cim_mapping {
                let rendered = render(template, |name| {
                    caps.name(name).map(|m| m.as_str().to_owned())
                });
                if let Some(value) = rendered {
                    set_cim_field(&mut record, field, value);
                }
            }
            return record;
        }

        record.action = Action::Unparsed;
        record
    }

    /// JSON 유닛을 파싱합니다.
    fn parse_json_unit(
        &self,
        raw: &str,
        map: &serde_json::Map<String, Value>,
        source_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> CimRecord {
        let source = source_hint.unwrap_or("unknown").to_owned();
        let mut record = CimRecord::new(now, source, raw);

        let flat = flatten_object(map);
        let lookup = |name: &str| flat.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());

        // journald __REALTIME_TIMESTAMP (epoch 마이크로초) 우선
        if let Some(ts) = lookup("__REALTIME_TIMESTAMP")
            .and_then(|v| parse_json_timestamp(&v))
            .or_else(|| lookup("timestamp").and_then(|v| parse_json_timestamp(&v)))
        {
            record.timestamp = ts;
        }

        if let Some(hostname) = lookup("_HOSTNAME").or_else(|| lookup("hostname")) {
            record.hostname = Some(hostname);
        }
        if let Some(message) = lookup("MESSAGE").or_else(|| lookup("message")) {
            record.message = Some(message);
        }

        // 소스의 첫 json 규칙이 적용됩니다. 해석되지 않는 placeholder는
        // 해당 필드만 비웁니다. 규칙 탈락 사유가 아닙니다.
        for candidate in self.rules.candidates(source_hint) {
            if candidate.rule.method != ParsingMethod::Json {
                continue;
            }

            for (field, template) in &candidate.rule.cim_mapping {
                if let Some(value) = render(template, lookup) {
                    set_cim_field(&mut record, field, value);
                }
            }
            return record;
        }

        record.action = Action::Unparsed;
        record
    }
}

/// 연도 없는 BSD 타임스탬프를 복원합니다.
///
/// 현재 연도를 가정하되, 결과가 기준 시각보다 미래이면 연말 경계를
/// 넘은 것으로 보고 한 해를 뺍니다.
fn parse_bsd_timestamp(
    month: &str,
    day: &str,
    time: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let with_year = |year: i32| -> Option<DateTime<Utc>> {
        let composed = format!("{year} {month} {day} {time}");
        let naive = NaiveDateTime::parse_from_str(&composed, "%Y %b %d %H:%M:%S").ok()?;
        Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
    };

    let current = with_year(now.year())?;
    if current > now {
        with_year(now.year() - 1)
    } else {
        Some(current)
    }
}

/// JSON 값에서 타임스탬프를 복원합니다.
///
/// RFC 3339 문자열, epoch 마이크로초(16자리 이상), 밀리초(13자리 이상),
/// 초 단위 숫자를 순서대로 시도합니다.
fn parse_json_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let digits = value.trim();
    let numeric: i64 = digits.parse().ok()?;
    if digits.len() >= 16 {
        DateTime::from_timestamp_micros(numeric)
    } else if digits.len() >= 13 {
        DateTime::from_timestamp_millis(numeric)
    } else {
        DateTime::from_timestamp(numeric, 0)
    }
}

/// JSON 오브젝트를 평탄화합니다.
///
/// 중첩된 오브젝트는 점 표기 키(`parent.child`)로 펼쳐지고,
/// 스칼라는 문자열로 변환됩니다. 배열은 JSON 문자열 그대로 둡니다.
fn flatten_object(map: &serde_json::Map<String, Value>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into(map, "", &mut out);
    out
}

fn flatten_into(map: &serde_json::Map<String, Value>, prefix: &str, out: &mut Vec<(String, String)>) {
    for (key, value) in map {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(nested, &full_key, out),
            Value::String(s) => out.push((full_key, s.clone())),
            Value::Number(n) => out.push((full_key, n.to_string())),
            Value::Bool(b) => out.push((full_key, b.to_string())),
            Value::Null => {}
            Value::Array(_) => out.push((full_key, value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RULES: &str = r#"
- name: ssh_failed_password
  log_source: auth
  method: regex
  regex: 'Failed password for (?P<user>\S+) from (?P<src_ip>\S+) port (?P<src_port>\d+)'
  cim_mapping:
    action: denied
    status: failure
    user: "{user}"
    src_ip: "{src_ip}"
    src_port: "{src_port}"
- name: cron_session
  log_source: syslog
  method: regex
  regex: 'session opened for user (?P<user>\S+)'
  cim_mapping:
    action: allowed
    user: "{user}"
- name: journald_cim
  log_source: journald
  method: json
  cim_mapping:
    process_name: "{_COMM}"
    app: "{_SYSTEMD_UNIT}"
"#;

    fn parser() -> LogParser {
        LogParser::new(RuleBook::parse_yaml(RULES, "rules.yml").unwrap())
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_ssh_failed_password_line() {
        let raw = "Jul 11 10:01:01 web01 sshd[4623]: Failed password for root from 203.0.113.9 port 4625 ssh2";
        let record = parser().parse_at(raw, Some("auth"), fixed_now());

        assert_eq!(record.hostname.as_deref(), Some("web01"));
        assert_eq!(record.process_name.as_deref(), Some("sshd"));
        assert_eq!(record.pid, Some(4623));
        assert_eq!(record.action, Action::Denied);
        assert_eq!(record.status.as_deref(), Some("failure"));
        assert_eq!(record.user.as_deref(), Some("root"));
        assert_eq!(record.src_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(record.src_port, Some(4625));
        assert_eq!(record.raw_message, raw);
        assert_eq!(record.timestamp.month(), 7);
        assert_eq!(record.timestamp.day(), 11);
        assert_eq!(record.timestamp.year(), 2026);
    }

    #[test]
    fn cron_line_without_matching_rule_is_unparsed() {
        let raw = "Jul 11 10:17:01 web01 CRON[5511]: (root) CMD (command -v debian-sa1)";
        let record = parser().parse_at(raw, Some("syslog"), fixed_now());

        assert_eq!(record.action, Action::Unparsed);
        assert_eq!(record.hostname.as_deref(), Some("web01"));
        assert_eq!(record.process_name.as_deref(), Some("CRON"));
        assert_eq!(record.pid, Some(5511));
        assert_eq!(record.raw_message, raw);
    }

    #[test]
    fn source_hint_limits_candidate_rules() {
        // auth 규칙에 매칭될 내용이지만 syslog 힌트로는 후보가 아님
        let raw = "Jul 11 10:01:01 web01 sshd[4623]: Failed password for root from 203.0.113.9 port 4625 ssh2";
        let record = parser().parse_at(raw, Some("syslog"), fixed_now());
        assert_eq!(record.action, Action::Unparsed);
    }

    #[test]
    fn missing_hint_tries_all_rules() {
        let raw = "Jul 11 10:01:01 web01 sshd[4623]: Failed password for root from 203.0.113.9 port 4625 ssh2";
        let record = parser().parse_at(raw, None, fixed_now());
        assert_eq!(record.action, Action::Denied);
        assert_eq!(record.log_source, "unknown");
    }

    #[test]
    fn anchored_rule_matches_extracted_message_body() {
        // 앵커된 패턴은 헤더가 아니라 추출된 메시지 본문 기준으로
        // 매칭되어야 한다.
        let yaml = r#"
- name: ssh_failed_anchored
  log_source: auth
  method: regex
  regex: '^Failed password for (?P<user>\S+)'
  cim_mapping:
    action: denied
    user: "{user}"
"#;
        let parser = LogParser::new(RuleBook::parse_yaml(yaml, "rules.yml").unwrap());
        let raw = "Jul 11 10:01:01 web01 sshd[4623]: Failed password for root from 203.0.113.9 port 4625 ssh2";
        let record = parser.parse_at(raw, Some("auth"), fixed_now());

        assert_eq!(record.user.as_deref(), Some("root"));
        assert_eq!(record.action, Action::Denied);
    }

    #[test]
    fn year_rollover_assumes_previous_year() {
        // 기준 시각 1월, 로그는 12월 — 전년도로 복원
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let raw = "Dec 31 23:59:59 web01 sshd[1]: Connection closed";
        let record = parser().parse_at(raw, Some("auth"), now);
        assert_eq!(record.timestamp.year(), 2025);
        assert_eq!(record.timestamp.month(), 12);
    }

    #[test]
    fn strictly_future_timestamp_rolls_back_one_year() {
        let now = Utc.with_ymd_and_hms(2026, 7, 15, 12, 0, 0).unwrap();
        let raw = "Jul 15 12:00:01 web01 sshd[1]: Connection closed";
        let record = parser().parse_at(raw, Some("auth"), now);
        assert_eq!(record.timestamp.year(), 2025);
    }

    #[test]
    fn past_timestamp_keeps_current_year() {
        let now = Utc.with_ymd_and_hms(2026, 7, 15, 12, 0, 0).unwrap();
        let raw = "Jul 15 11:59:59 web01 sshd[1]: Connection closed";
        let record = parser().parse_at(raw, Some("auth"), now);
        assert_eq!(record.timestamp.year(), 2026);
    }

    #[test]
    fn headerless_line_falls_back_to_now() {
        let now = fixed_now();
        let record = parser().parse_at("free-form text without header", Some("syslog"), now);
        assert_eq!(record.timestamp, now);
        assert_eq!(record.action, Action::Unparsed);
        assert_eq!(
            record.message.as_deref(),
            Some("free-form text without header")
        );
    }

    #[test]
    fn journald_unit_maps_via_json_rule() {
        let raw = r#"{"__REALTIME_TIMESTAMP":"1752228061000000","_HOSTNAME":"web01","_COMM":"cron","_SYSTEMD_UNIT":"cron.service","MESSAGE":"job started"}"#;
        let record = parser().parse_at(raw, Some("journald"), fixed_now());

        assert_eq!(record.hostname.as_deref(), Some("web01"));
        assert_eq!(record.process_name.as_deref(), Some("cron"));
        assert_eq!(record.message.as_deref(), Some("job started"));
        assert_eq!(
            record.fields,
            vec![("app".to_owned(), "cron.service".to_owned())]
        );
        assert_eq!(record.action, Action::Observed);
        // epoch 마이크로초 복원
        assert_eq!(record.timestamp.timestamp(), 1_752_228_061);
    }

    #[test]
    fn journald_missing_mapped_key_drops_field_only() {
        let raw = r#"{"__REALTIME_TIMESTAMP":"1752228061000000","_COMM":"cron","MESSAGE":"x"}"#;
        let record = parser().parse_at(raw, Some("journald"), fixed_now());
        // _SYSTEMD_UNIT이 없으므로 app 필드는 빠지지만 규칙은 적용됨
        assert_eq!(record.process_name.as_deref(), Some("cron"));
        assert!(record.fields.is_empty());
        assert_eq!(record.action, Action::Observed);
    }

    #[test]
    fn json_rule_with_no_resolved_placeholders_still_applies() {
        // 매핑 키가 전부 없는 유닛도 규칙은 적용된다. 빠진 placeholder는
        // 필드 누락일 뿐 unparsed가 아니다.
        let raw = r#"{"MESSAGE":"job started"}"#;
        let record = parser().parse_at(raw, Some("journald"), fixed_now());

        assert_eq!(record.action, Action::Observed);
        assert_eq!(record.message.as_deref(), Some("job started"));
        assert!(record.process_name.is_none());
        assert!(record.fields.is_empty());
    }

    #[test]
    fn surrounding_whitespace_preserved_in_raw_message() {
        let raw = "  Jul 11 10:17:01 web01 CRON[5511]: session text  ";
        let record = parser().parse_at(raw, Some("syslog"), fixed_now());
        assert_eq!(record.raw_message, raw);
        assert_eq!(record.hostname.as_deref(), Some("web01"));
    }

    #[test]
    fn json_without_matching_rule_is_unparsed() {
        let raw = r#"{"unrelated":"value"}"#;
        let record = parser().parse_at(raw, Some("auth"), fixed_now());
        assert_eq!(record.action, Action::Unparsed);
        assert_eq!(record.raw_message, raw);
    }

    #[test]
    fn malformed_json_is_treated_as_text() {
        let raw = "{not valid json";
        let record = parser().parse_at(raw, Some("syslog"), fixed_now());
        assert_eq!(record.action, Action::Unparsed);
        assert_eq!(record.raw_message, raw);
    }

    #[test]
    fn empty_unit_is_unparsed_with_now() {
        let now = fixed_now();
        let record = parser().parse_at("", Some("syslog"), now);
        assert_eq!(record.action, Action::Unparsed);
        assert_eq!(record.timestamp, now);
    }

    #[test]
    fn oversized_unit_is_unparsed() {
        let raw = "x".repeat(MAX_UNIT_SIZE + 1);
        let record = parser().parse_at(&raw, Some("syslog"), fixed_now());
        assert_eq!(record.action, Action::Unparsed);
    }

    #[test]
    fn rfc3339_json_timestamp() {
        let ts = parse_json_timestamp("2026-07-11T10:01:01Z").unwrap();
        assert_eq!(ts.year(), 2026);
    }

    #[test]
    fn epoch_seconds_json_timestamp() {
        let ts = parse_json_timestamp("1752228061").unwrap();
        assert_eq!(ts.timestamp(), 1_752_228_061);
    }

    #[test]
    fn epoch_millis_json_timestamp() {
        let ts = parse_json_timestamp("1752228061123").unwrap();
        assert_eq!(ts.timestamp(), 1_752_228_061);
    }

    #[test]
    fn nested_json_flattens_with_dot_keys() {
        let value: Value =
            serde_json::from_str(r#"{"outer":{"inner":"v"},"n":42,"b":true,"z":null}"#).unwrap();
        let Value::Object(map) = value else {
            unreachable!()
        };
        let flat = flatten_object(&map);
        assert!(flat.contains(&("outer.inner".to_owned(), "v".to_owned())));
        assert!(flat.contains(&("n".to_owned(), "42".to_owned())));
        assert!(flat.contains(&("b".to_owned(), "true".to_owned())));
        assert!(!flat.iter().any(|(k, _)| k == "z"));
    }

    #[cfg(test)]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_arbitrary_text_does_not_panic(raw in ".{0,500}") {
                let _ = parser().parse(&raw, Some("syslog"));
            }

            #[test]
            fn parse_always_preserves_raw_message(raw in "[^\r\n]{1,200}") {
                let record = parser().parse(&raw, None);
                prop_assert_eq!(record.raw_message, raw);
            }
        }
    }
}
