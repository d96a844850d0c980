//! Rule and dictionary sources: where raw records come from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::dictionary::{Dictionaries, DictionarySource};
use crate::error::{SourceError, SourceResult};
use crate::record::RuleRecord;

/// Supplier of raw rule records (database table, file, fixture).
///
/// Sources return records as stored; validation happens when the
/// repository builds a `RuleSet`, so one bad record never fails a load.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn load_rules(&self) -> SourceResult<Vec<RuleRecord>>;

    /// Source label for logs and load reports.
    fn name(&self) -> &str;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RulesDocument {
    List(Vec<RuleRecord>),
    Wrapped { rules: Vec<RuleRecord> },
}

impl RulesDocument {
    fn into_records(self) -> Vec<RuleRecord> {
        match self {
            Self::List(records) | Self::Wrapped { rules: records } => records,
        }
    }
}

async fn read_file(path: &Path) -> SourceResult<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SourceError::NotFound(path.display().to_string())
        } else {
            SourceError::Io(format!("{}: {e}", path.display()))
        }
    })
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn parse_document<T: serde::de::DeserializeOwned>(path: &Path, content: &str) -> SourceResult<T> {
    if is_toml(path) {
        toml::from_str(content).map_err(|e| SourceError::Parse(format!("{}: {e}", path.display())))
    } else {
        serde_json::from_str(content)
            .map_err(|e| SourceError::Parse(format!("{}: {e}", path.display())))
    }
}

/// Rules from a JSON file (an array, or `{"rules": [...]}`) or a TOML file
/// with `[[rules]]` tables.
pub struct FileRuleSource {
    path: PathBuf,
    label: String,
}

impl FileRuleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("file:{}", path.display());
        Self { path, label }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RuleSource for FileRuleSource {
    async fn load_rules(&self) -> SourceResult<Vec<RuleRecord>> {
        let content = read_file(&self.path).await?;
        let doc: RulesDocument = parse_document(&self.path, &content)?;
        Ok(doc.into_records())
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Dictionaries from a JSON or TOML file with `suppliers`, `materials`,
/// `factories`, `statuses` and `projects` lists.
pub struct FileDictionarySource {
    path: PathBuf,
    label: String,
}

impl FileDictionarySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("file:{}", path.display());
        Self { path, label }
    }
}

#[async_trait]
impl DictionarySource for FileDictionarySource {
    async fn load(&self) -> SourceResult<Dictionaries> {
        let content = read_file(&self.path).await?;
        parse_document(&self.path, &content)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RuleSet;

    async fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("iq-engine-{}-{name}", std::process::id()));
        tokio::fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn json_array_and_wrapped_forms() {
        let array = write_temp(
            "rules-array.json",
            r#"[{"name": "通用库存查询", "triggerWords": ["库存"], "template": "SELECT 1"}]"#,
        )
        .await;
        let wrapped = write_temp(
            "rules-wrapped.json",
            r#"{"rules": [{"intent_name": "a", "keywords": "库存", "action_target": "SELECT 1"},
                          {"intent_name": "b", "keywords": "批次", "action_target": "SELECT 2"}]}"#,
        )
        .await;

        assert_eq!(FileRuleSource::new(&array).load_rules().await.unwrap().len(), 1);
        let records = FileRuleSource::new(&wrapped).load_rules().await.unwrap();
        assert_eq!(RuleSet::build(records).active().len(), 2);
    }

    #[tokio::test]
    async fn toml_rules() {
        let path = write_temp(
            "rules.toml",
            r#"
[[rules]]
id = "supplier-stock"
name = "供应商库存查询"
scenario = "inventory"
trigger_words = ["供应商库存", "供应商"]
template = "SELECT * FROM inventory WHERE supplier_name LIKE {supplier}"
priority = 10

[[rules.parameter_specs]]
name = "supplier"
kind = "fuzzy-string"
required = true
"#,
        )
        .await;
        let set = RuleSet::build(FileRuleSource::new(&path).load_rules().await.unwrap());
        assert!(set.rejected().is_empty());
        let rule = set.lookup("supplier-stock").unwrap();
        assert_eq!(rule.rule.priority, 10);
        assert!(rule.template.references("supplier"));
    }

    #[tokio::test]
    async fn missing_and_unparseable_files() {
        let missing = FileRuleSource::new("/nonexistent/rules.json");
        assert!(matches!(
            missing.load_rules().await,
            Err(SourceError::NotFound(_))
        ));

        let garbage = write_temp("rules-garbage.json", "{not json").await;
        assert!(matches!(
            FileRuleSource::new(&garbage).load_rules().await,
            Err(SourceError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn dictionary_file() {
        let path = write_temp(
            "dict.json",
            r#"{"suppliers": ["聚龙", "欣旺达"], "statuses": ["正常", "风险", "冻结"]}"#,
        )
        .await;
        let source = FileDictionarySource::new(&path);
        let d = source.load().await.unwrap();
        assert_eq!(d.suppliers, vec!["聚龙", "欣旺达"]);
        assert!(d.materials.is_empty());
        assert!(source.name().starts_with("file:"));
    }
}
