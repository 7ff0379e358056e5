//! 파싱 규칙 로더 -- YAML 규칙 파일을 디스크에서 로드합니다.
//!
//! 규칙 파일은 파서의 동작을 정의하는 load-bearing 설정입니다.
//! 파일이 없거나 파싱에 실패하면 기동을 중단해야 하므로
//! 개별 규칙의 오류도 치명적 에러로 처리합니다. 이름이 중복된
//! 규칙만 예외로, 먼저 적힌 규칙을 남기고 경고 후 건너뜁니다.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;

use crate::error::PipelineError;

use super::rules::{ParsingMethod, ParsingRule};

const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_RULES_COUNT: usize = 10_000;

/// 컴파일된 파싱 규칙
///
/// 정규식은 로드 시점에 한 번만 컴파일됩니다.
#[derive(Debug)]
pub struct CompiledRule {
    /// 원본 규칙
    pub rule: ParsingRule,
    /// 컴파일된 정규식 (regex 방식만)
    pub regex: Option<Regex>,
}

/// 규칙집 — 로드 및 컴파일이 끝난 규칙 목록
///
/// 규칙은 파일에 적힌 순서를 유지합니다. 한 유닛에 여러 규칙이
/// 매칭 가능할 때 먼저 적힌 규칙이 이깁니다.
#[derive(Debug)]
pub struct RuleBook {
    rules: Vec<CompiledRule>,
}

impl RuleBook {
    /// YAML 파일에서 규칙집을 로드합니다.
    ///
    /// # Errors
    /// - 파일을 읽을 수 없는 경우
    /// - YAML 파싱 실패
    /// - 규칙 유효성 검증 실패 또는 정규식 컴파일 실패
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| PipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(PipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| PipelineError::RuleLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// YAML 문자열에서 규칙집을 파싱합니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<Self, PipelineError> {
        let rules: Vec<ParsingRule> =
            serde_yaml::from_str(yaml_str).map_err(|e| PipelineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        if rules.is_empty() {
            return Err(PipelineError::RuleLoad {
                path: source.to_owned(),
                reason: "rule file contains no rules".to_owned(),
            });
        }

        if rules.len() > MAX_RULES_COUNT {
            return Err(PipelineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("too many rules: max {MAX_RULES_COUNT}"),
            });
        }

        let mut seen_names = HashSet::new();
        let mut compiled = Vec::with_capacity(rules.len());

        for rule in rules {
            rule.validate()?;

            if !seen_names.insert(rule.name.clone()) {
                tracing::warn!(source, rule = %rule.name, "skipping duplicate rule name");
                continue;
            }

            let regex = match rule.method {
                ParsingMethod::Regex => {
                    let pattern = rule.regex.as_deref().unwrap_or_default();
                    let compiled_regex =
                        Regex::new(pattern).map_err(|e| PipelineError::RuleValidation {
                            rule_name: rule.name.clone(),
                            reason: format!("regex compile error: {e}"),
                        })?;
                    Some(compiled_regex)
                }
                ParsingMethod::Json => None,
            };

            compiled.push(CompiledRule { rule, regex });
        }

        tracing::info!(source, count = compiled.len(), "loaded parsing rules");

        Ok(Self { rules: compiled })
    }

    /// 전체 규칙 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 규칙이 없는지 여부를 반환합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 주어진 로그 소스에 적용 가능한 규칙을 파일 순서대로 반환합니다.
    ///
    /// 소스 힌트가 없으면 모든 규칙이 후보가 됩니다.
    pub fn candidates<'a>(
        &'a self,
        log_source: Option<&'a str>,
    ) -> impl Iterator<Item = &'a CompiledRule> {
        self.rules
            .iter()
            .filter(move |c| log_source.is_none_or(|s| c.rule.log_source == s))
    }
}
