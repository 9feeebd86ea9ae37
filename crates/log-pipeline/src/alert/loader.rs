//! 규칙 파일 로더 -- YAML 알림 규칙을 디스크에서 로드합니다.
//!
//! 파일 하나에 여러 규칙을 담을 수 있습니다. 최상위는 규칙 목록이거나
//! `rules:` 키 아래의 목록입니다.
//!
//! ```yaml
//! rules:
//!   - id: oom
//!     name: Out Of Memory
//!     pattern: "out of memory|oom-killer"
//!     severity: critical
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::LogPipelineError;

use super::rule::{AlertRule, RuleDefinition};

const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_RULES_COUNT: usize = 10_000;

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleFile {
    List(Vec<RuleDefinition>),
    Wrapped { rules: Vec<RuleDefinition> },
}

impl RuleFile {
    fn into_definitions(self) -> Vec<RuleDefinition> {
        match self {
            Self::List(defs) | Self::Wrapped { rules: defs } => defs,
        }
    }
}

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 디렉토리에서 모든 YAML 규칙 파일을 로드합니다.
    ///
    /// `.yml` 또는 `.yaml` 확장자를 가진 파일만 처리합니다. 파일 이름 순으로 읽으며,
    /// 개별 파일 로딩 실패와 앞선 파일과 겹치는 규칙 ID는 경고 로그를 남기고 건너뜁니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 규칙 수가 `MAX_RULES_COUNT`를 초과하는 경우
    pub async fn load_directory(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<AlertRule>, LogPipelineError> {
        let dir = dir.as_ref();
        let dir_error = |reason: String| LogPipelineError::RuleLoad {
            path: dir.display().to_string(),
            reason,
        };

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| dir_error(format!("failed to read directory: {e}")))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| dir_error(format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut rules = Vec::new();
        let mut seen_ids = HashSet::new();

        for path in paths {
            let loaded = match Self::load_file(&path).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load rule file, skipping"
                    );
                    continue;
                }
            };

            for rule in loaded {
                if !seen_ids.insert(rule.id().to_owned()) {
                    tracing::warn!(
                        rule_id = rule.id(),
                        path = %path.display(),
                        "duplicate rule id, skipping"
                    );
                    continue;
                }
                rules.push(rule);
            }

            if rules.len() > MAX_RULES_COUNT {
                return Err(dir_error(format!("too many rules: max {MAX_RULES_COUNT}")));
            }
        }

        tracing::info!(
            dir = %dir.display(),
            count = rules.len(),
            "loaded alert rules"
        );

        Ok(rules)
    }

    /// 단일 YAML 파일에서 규칙을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Vec<AlertRule>, LogPipelineError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| LogPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(LogPipelineError::RuleLoad {
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
                .map_err(|e| LogPipelineError::RuleLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// 파일 또는 디렉토리 경로에서 규칙을 로드합니다.
    pub async fn load_path(path: impl AsRef<Path>) -> Result<Vec<AlertRule>, LogPipelineError> {
        let path = path.as_ref();
        let is_dir = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .map_err(|e| LogPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read metadata: {e}"),
            })?;

        if is_dir {
            Self::load_directory(path).await
        } else {
            Self::load_file(path).await
        }
    }

    /// YAML 문자열을 파싱하여 규칙을 컴파일합니다.
    ///
    /// 규칙 하나라도 유효하지 않거나 파일 안에서 ID가 겹치면 전체가 실패합니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<Vec<AlertRule>, LogPipelineError> {
        let file: RuleFile =
            serde_yaml::from_str(yaml_str).map_err(|e| LogPipelineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        let definitions = file.into_definitions();
        if definitions.len() > MAX_RULES_COUNT {
            return Err(LogPipelineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("too many rules: max {MAX_RULES_COUNT}"),
            });
        }

        let mut seen_ids = HashSet::new();
        let mut rules = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let rule = definition.compile()?;
            if !seen_ids.insert(rule.id().to_owned()) {
                return Err(LogPipelineError::RuleValidation {
                    rule_id: rule.id().to_owned(),
                    reason: format!("duplicate rule id in {source}"),
                });
            }
            rules.push(rule);
        }

        Ok(rules)
    }
}
