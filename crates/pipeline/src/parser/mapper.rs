//! CIM 필드 매핑 적용
//!
//! 규칙의 `cim_mapping` 템플릿을 캡처 값에 적용하여 정규화 레코드의
//! 필드를 채웁니다. 템플릿의 `{name}` 자리표시자는 캡처 값으로
//! 치환되며, 하나라도 해석되지 않으면 해당 필드는 채우지 않습니다.

use logpond_core::types::{Action, CimRecord};

/// 템플릿을 렌더링합니다.
///
/// `lookup`이 자리표시자 이름을 값으로 해석합니다. 자리표시자가 없는
/// 템플릿은 리터럴 값으로 그대로 반환됩니다. 해석되지 않는
/// 자리표시자가 하나라도 있으면 `None`을 반환합니다.
pub fn render<F>(template: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if !template.contains('{') {
        return Some(template.to_owned());
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let close = after_open.find('}')?;
        let name = &after_open[..close];
        if name.is_empty() {
            return None;
        }
        out.push_str(&lookup(name)?);
        rest = &after_open[close + 1..];
    }

    out.push_str(rest);
    Some(out)
}

/// 렌더링된 값을 레코드의 CIM 필드에 설정합니다.
///
/// canonical 필드는 타입에 맞게 설정하고, 숫자 필드에 숫자가 아닌 값이
/// 오면 버립니다. canonical 스키마 밖의 필드명은 `fields`에 보존합니다.
pub fn set_cim_field(record: &mut CimRecord, field: &str, value: String) {
    match field {
        "hostname" => record.hostname = Some(value),
        "log_source" => record.log_source = value,
        "process_name" => record.process_name = Some(value),
        "pid" => record.pid = parse_i64(&value),
        "uid" => record.uid = parse_i64(&value),
        "gid" => record.gid = parse_i64(&value),
        "action" => record.action = Action::from(value.as_str()),
        "status" => record.status = Some(value),
        "user" => record.user = Some(value),
        "src_ip" => record.src_ip = Some(value),
        "dest_ip" => record.dest_ip = Some(value),
        "src_port" => record.src_port = parse_port(&value),
        "dest_port" => record.dest_port = parse_port(&value),
        "command" => record.command = Some(value),
        "object" => record.object = Some(value),
        "message" => record.message = Some(value),
        // timestamp/raw_message/hash_id는 파서와 dedup이 직접 관리
        "timestamp" | "raw_message" | "hash_id" => {}
        other => record.fields.push((other.to_owned(), value)),
    }
}

fn parse_i64(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

fn parse_port(value: &str) -> Option<u16> {
    value.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;

    fn lookup_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn literal_template_passes_through() {
        let result = render("denied", |_| None);
        assert_eq!(result.as_deref(), Some("denied"));
    }

    #[test]
    fn single_placeholder_resolves() {
        let map = lookup_map(&[("user", "root")]);
        let result = render("{user}", |name| map.get(name).cloned());
        assert_eq!(result.as_deref(), Some("root"));
    }

    #[test]
    fn mixed_literal_and_placeholder() {
        let map = lookup_map(&[("unit", "cron.service")]);
        let result = render("unit={unit}", |name| map.get(name).cloned());
        assert_eq!(result.as_deref(), Some("unit=cron.service"));
    }

    #[test]
    fn unresolved_placeholder_drops_field() {
        let map = lookup_map(&[("user", "root")]);
        let result = render("{user}@{host}", |name| map.get(name).cloned());
        assert_eq!(result, None);
    }

    #[test]
    fn unterminated_placeholder_drops_field() {
        let result = render("{user", |_| Some("x".to_owned()));
        assert_eq!(result, None);
    }

    #[test]
    fn empty_placeholder_drops_field() {
        let result = render("{}", |_| Some("x".to_owned()));
        assert_eq!(result, None);
    }

    #[test]
    fn multiple_placeholders_resolve_in_order() {
        let map = lookup_map(&[("a", "1"), ("b", "2")]);
        let result = render("{a}-{b}", |name| map.get(name).cloned());
        assert_eq!(result.as_deref(), Some("1-2"));
    }

    #[test]
    fn canonical_field_sets_typed_value() {
        let mut record = CimRecord::new(Utc::now(), "auth", "raw");
        set_cim_field(&mut record, "user", "root".to_owned());
        set_cim_field(&mut record, "src_port", "4625".to_owned());
        assert_eq!(record.user.as_deref(), Some("root"));
        assert_eq!(record.src_port, Some(4625));
    }

    #[test]
    fn non_numeric_port_becomes_none() {
        let mut record = CimRecord::new(Utc::now(), "auth", "raw");
        set_cim_field(&mut record, "src_port", "not-a-port".to_owned());
        assert_eq!(record.src_port, None);
    }

    #[test]
    fn non_numeric_pid_becomes_none() {
        let mut record = CimRecord::new(Utc::now(), "auth", "raw");
        set_cim_field(&mut record, "pid", "abc".to_owned());
        assert_eq!(record.pid, None);
    }

    #[test]
    fn action_value_maps_to_enum() {
        let mut record = CimRecord::new(Utc::now(), "auth", "raw");
        set_cim_field(&mut record, "action", "denied".to_owned());
        assert_eq!(record.action, Action::Denied);
    }

    #[test]
    fn unknown_field_lands_in_fields_vec() {
        let mut record = CimRecord::new(Utc::now(), "journald", "raw");
        set_cim_field(&mut record, "app", "cron.service".to_owned());
        assert_eq!(
            record.fields,
            vec![("app".to_owned(), "cron.service".to_owned())]
        );
    }

    #[test]
    fn raw_message_is_not_overwritable() {
        let mut record = CimRecord::new(Utc::now(), "auth", "original");
        set_cim_field(&mut record, "raw_message", "mutated".to_owned());
        assert_eq!(record.raw_message, "original");
    }
}
