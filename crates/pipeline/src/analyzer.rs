//! 저장된 레코드에 대한 분석 규칙 평가
//!
//! 분석 규칙은 스토어 조회 조건의 선언입니다. 파싱 규칙과 달리
//! 탐지 레이어는 load-bearing이 아니므로, 규칙 파일이 없거나 개별
//! 규칙이 잘못되어도 파이프라인은 계속 동작합니다 (경고 후 건너뜀).
//! 단, 존재하는 규칙 파일이 YAML로 읽히지 않으면 에러입니다.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use uuid::Uuid;

use logpond_core::store::{RecordQuery, RecordStore};
use logpond_core::types::{CimRecord, CANONICAL_FIELDS};

use crate::error::PipelineError;

/// 분석 규칙
///
/// # YAML 예시
/// ```yaml
/// - name: failed_password_burst
///   log_source: auth
///   pattern: "*Failed password*"
/// - name: root_denied
///   filters:
///     user: root
///     action: denied
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRule {
    /// 규칙 이름
    pub name: String,
    /// canonical 필드 등호 조건
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    /// log_source 제한
    #[serde(default)]
    pub log_source: Option<String>,
    /// message 와일드카드 패턴
    #[serde(default)]
    pub pattern: Option<String>,
}

impl AnalysisRule {
    /// 규칙의 유효성을 검증합니다.
    ///
    /// 필터 키는 canonical 필드여야 하고, 조건이 하나는 있어야 합니다.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.is_empty() {
            return Err(PipelineError::RuleValidation {
                rule_name: "<unnamed>".to_owned(),
                reason: "rule name must not be empty".to_owned(),
            });
        }

        if self.filters.is_empty() && self.pattern.is_none() && self.log_source.is_none() {
            return Err(PipelineError::RuleValidation {
                rule_name: self.name.clone(),
                reason: "rule must have at least one condition".to_owned(),
            });
        }

        for field in self.filters.keys() {
            if !CANONICAL_FIELDS.contains(&field.as_str()) {
                return Err(PipelineError::RuleValidation {
                    rule_name: self.name.clone(),
                    reason: format!("unknown filter field: '{field}'"),
                });
            }
        }

        Ok(())
    }

    fn to_query(&self) -> RecordQuery {
        let mut query = RecordQuery::new();
        for (field, value) in &self.filters {
            query = query.filter(field, value);
        }
        if let Some(source) = &self.log_source {
            query = query.log_source(source);
        }
        if let Some(pattern) = &self.pattern {
            query = query.pattern(pattern);
        }
        query
    }
}

/// 규칙 매칭 결과
#[derive(Debug)]
pub struct Finding {
    /// 발견 식별자
    pub id: Uuid,
    /// 매칭된 규칙 이름
    pub rule_name: String,
    /// 조건에 걸린 레코드들
    pub records: Vec<CimRecord>,
}

/// 분석기
pub struct Analyzer<S> {
    store: S,
    rules: Vec<AnalysisRule>,
}

impl<S: RecordStore> Analyzer<S> {
    /// 규칙 목록으로 분석기를 생성합니다.
    ///
    /// 잘못된 규칙은 경고를 남기고 제외됩니다.
    pub fn new(store: S, rules: Vec<AnalysisRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter(|rule| match rule.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(rule = %rule.name, error = %e, "skipping invalid analysis rule");
                    false
                }
            })
            .collect();
        Self { store, rules }
    }

    /// YAML 파일에서 규칙을 로드합니다.
    ///
    /// 파일이 없으면 탐지 레이어 없이 동작합니다 (빈 목록). 존재하는
    /// 파일의 YAML 파싱 실패는 에러입니다. 무시하면 쓰여 있는 탐지
    /// 규칙이 조용히 꺼진 채 돌게 됩니다.
    ///
    /// # Errors
    /// - YAML 파싱 실패
    pub async fn load_rules(path: impl AsRef<Path>) -> Result<Vec<AnalysisRule>, PipelineError> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "analysis rules unavailable, running without detection"
                );
                return Ok(Vec::new());
            }
        };

        let rules = serde_yaml::from_str::<Vec<AnalysisRule>>(&content).map_err(|e| {
            PipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("YAML parse error: {e}"),
            }
        })?;

        tracing::info!(path = %path.display(), count = rules.len(), "loaded analysis rules");
        Ok(rules)
    }

    /// 로드된 규칙 수를 반환합니다.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 모든 규칙을 평가하고 매칭된 결과를 반환합니다.
    ///
    /// 개별 규칙의 조회 실패는 에러 로그를 남기고 건너뜁니다.
    pub async fn evaluate(&self) -> Vec<Finding> {
        let mut findings = Vec::new();

        for rule in &self.rules {
            let records = match self.store.query(&rule.to_query()).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::error!(rule = %rule.name, error = %e, "analysis rule query failed");
                    continue;
                }
            };

            if records.is_empty() {
                continue;
            }

            tracing::info!(rule = %rule.name, matches = records.len(), "analysis rule matched");
            findings.push(Finding {
                id: Uuid::new_v4(),
                rule_name: rule.name.clone(),
                records,
            });
        }

        findings
    }
}
