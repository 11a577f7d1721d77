use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Map, Value};

/// キャッシュに保存されたエンティティ情報を読み込むための構造体。
#[derive(Debug, Deserialize)]
struct CachedEntity {
    entity_id: String,
    entity_type: String,
    #[serde(default)]
    enriched_data: Value,
}

/// 担当者。
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Person {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Scrum/Taskのフィールド。
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ScrumTask {
    pub name: Option<String>,
    pub state: Option<String>,
    pub story_points: Option<f64>,
    pub sprint: Option<String>,
    pub epic: Option<String>,
    pub assignee: Option<Person>,
}

/// Scrum/Bugのフィールド。
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ScrumBug {
    pub name: Option<String>,
    pub state: Option<String>,
    pub severity: Option<String>,
    pub root_cause: Option<String>,
    pub assignee: Option<Person>,
}

/// Product/Featureのフィールド。
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ProductFeature {
    pub name: Option<String>,
    pub state: Option<String>,
    pub product_area: Option<String>,
    pub launch_date: Option<String>,
    pub owner: Option<Person>,
}

/// エンティティの種類ごとの情報。
///
/// 既知の種類は専用の構造体に変換し、それ以外は`Generic`としてそのまま保持する。
#[derive(Clone, Debug, PartialEq)]
pub enum EntityMetadata {
    ScrumTask(ScrumTask),
    ScrumBug(ScrumBug),
    ProductFeature(ProductFeature),
    Generic {
        entity_type: String,
        fields: Map<String, Value>,
    },
}

impl EntityMetadata {
    /// エンティティの種類に応じてフィールドを変換する。
    ///
    /// # Arguments
    ///
    /// * `entity_type` - `Scrum/Task`のようなエンティティの種類
    /// * `data` - エンティティのフィールド
    pub fn decode(entity_type: &str, data: Value) -> Result<Self> {
        let metadata = match entity_type {
            "Scrum/Task" => Self::ScrumTask(
                serde_json::from_value(data).context("Failed to decode Scrum/Task")?,
            ),
            "Scrum/Bug" => Self::ScrumBug(
                serde_json::from_value(data).context("Failed to decode Scrum/Bug")?,
            ),
            "Product/Feature" => Self::ProductFeature(
                serde_json::from_value(data).context("Failed to decode Product/Feature")?,
            ),
            _ => Self::Generic {
                entity_type: entity_type.to_string(),
                fields: match data {
                    Value::Object(fields) => fields,
                    Value::Null => Map::new(),
                    other => anyhow::bail!("Expected an object for {}, got {}", entity_type, other),
                },
            },
        };

        Ok(metadata)
    }

    /// エンティティの名前を返す。
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::ScrumTask(task) => task.name.as_deref(),
            Self::ScrumBug(bug) => bug.name.as_deref(),
            Self::ProductFeature(feature) => feature.name.as_deref(),
            Self::Generic { fields, .. } => fields.get("name").and_then(Value::as_str),
        }
    }

    /// エンティティの状態を返す。
    pub fn state(&self) -> Option<&str> {
        match self {
            Self::ScrumTask(task) => task.state.as_deref(),
            Self::ScrumBug(bug) => bug.state.as_deref(),
            Self::ProductFeature(feature) => feature.state.as_deref(),
            Self::Generic { fields, .. } => fields.get("state").and_then(Value::as_str),
        }
    }
}

/// 参照IDからエンティティ情報を引くためのカタログ。
#[derive(Debug, Default)]
pub struct EntityCatalog {
    entities: HashMap<String, EntityMetadata>,
}

impl EntityCatalog {
    /// キャッシュファイルからカタログを読み込む。
    ///
    /// 変換できないエンティティはスキップする。
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read entity cache at {}", path.display()))?;
        let cached: Vec<CachedEntity> =
            serde_json::from_str(&content).context("Failed to deserialize entity cache")?;

        let mut entities = HashMap::new();
        for entity in cached {
            match EntityMetadata::decode(&entity.entity_type, entity.enriched_data) {
                Ok(metadata) => {
                    entities.insert(entity.entity_id, metadata);
                }
                Err(err) => debug!("Skipping entity #{}: {:#}", entity.entity_id, err),
            }
        }
        info!("length of cached entities: {}", entities.len());

        Ok(Self { entities })
    }

    /// 参照IDに対応するエンティティ情報を返す。
    pub fn get(&self, reference_id: &str) -> Option<&EntityMetadata> {
        self.entities.get(reference_id)
    }
}
