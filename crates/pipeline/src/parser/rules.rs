//! 파싱 규칙 타입 정의
//!
//! YAML 규칙 파일의 구조를 나타내는 타입들입니다.
//! 규칙은 로그 소스별로 적용 방법(정규식 또는 JSON 매핑)과
//! CIM 필드 매핑 템플릿을 지정합니다.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::PipelineError;

/// 규칙 적용 방법
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingMethod {
    /// named capture group을 가진 정규식을 유닛에 적용
    Regex,
    /// JSON 오브젝트의 키를 매핑 템플릿에 공급
    Json,
}

/// 파싱 규칙
///
/// 하나의 규칙은 특정 로그 소스의 유닛을 CIM 필드로 변환하는 방법을
/// 기술합니다. `cim_mapping`의 값은 `{capture_name}` 자리표시자를 가진
/// 템플릿 문자열입니다.
///
/// # YAML 예시
/// ```yaml
/// - name: ssh_failed_password
///   log_source: auth
///   method: regex
///   regex: 'Failed password for (?P<user>\S+) from (?P<src_ip>\S+) port (?P<src_port>\d+)'
///   cim_mapping:
///     action: denied
///     status: failure
///     user: "{user}"
///     src_ip: "{src_ip}"
///     src_port: "{src_port}"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ParsingRule {
    /// 규칙 이름 (파일 내에서 유일해야 함)
    pub name: String,
    /// 적용 대상 로그 소스 태그
    pub log_source: String,
    /// 적용 방법
    pub method: ParsingMethod,
    /// 정규식 (method가 `regex`일 때 필수)
    #[serde(default)]
    pub regex: Option<String>,
    /// CIM 필드 매핑 템플릿 (필드명 -> 템플릿)
    #[serde(default)]
    pub cim_mapping: BTreeMap<String, String>,
}

impl ParsingRule {
    /// 규칙의 유효성을 검증합니다.
    ///
    /// # Errors
    /// - 이름 또는 log_source가 비어 있는 경우
    /// - regex 방식인데 정규식이 없는 경우
    /// - json 방식인데 정규식이 지정된 경우
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.is_empty() {
            return Err(PipelineError::RuleValidation {
                rule_name: "<unnamed>".to_owned(),
                reason: "rule name must not be empty".to_owned(),
            });
        }

        if self.log_source.is_empty() {
            return Err(PipelineError::RuleValidation {
                rule_name: self.name.clone(),
                reason: "log_source must not be empty".to_owned(),
            });
        }

        match self.method {
            ParsingMethod::Regex => {
                if self.regex.as_deref().unwrap_or("").is_empty() {
                    return Err(PipelineError::RuleValidation {
                        rule_name: self.name.clone(),
                        reason: "regex method requires a regex".to_owned(),
                    });
                }
            }
            ParsingMethod::Json => {
                if self.regex.is_some() {
                    return Err(PipelineError::RuleValidation {
                        rule_name: self.name.clone(),
                        reason: "json method must not have a regex".to_owned(),
                    });
                }
                if self.cim_mapping.is_empty() {
                    return Err(PipelineError::RuleValidation {
                        rule_name: self.name.clone(),
                        reason: "json method requires a cim_mapping".to_owned(),
                    });
                }
            }
        }

        Ok(())
    }
}
