use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateGroup, AggregateKey};
use crate::datetime;

/// 集計結果を保存するためのtrait。
#[cfg_attr(test, automock)]
pub trait AggregateStore {
    /// 集計結果を保存する。
    ///
    /// 同じ実行IDで同じキーのグループが既にある場合は、合計時間と件数を置き換える。
    ///
    /// # Arguments
    ///
    /// * `run_id` - 実行ID
    /// * `groups` - 保存する集計結果
    fn upsert_groups(&mut self, run_id: &str, groups: &[AggregateGroup]) -> Result<usize>;

    /// 実行IDに対応する集計結果を読み込む。
    fn load_groups(&self, run_id: &str) -> Result<Vec<AggregateGroup>>;

    /// 実行の情報を保存する。既にある場合は置き換える。
    fn save_run(&mut self, run_id: &str, info: &RunInfo) -> Result<()>;

    /// 実行の情報を読み込む。保存されていない場合は`None`を返す。
    fn load_run(&self, run_id: &str) -> Result<Option<RunInfo>>;
}

/// 1回の集計の実行情報。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    /// 集計期間の最初の日。`None`は制限なし。
    pub start: Option<NaiveDate>,
    /// 集計期間の最後の日(この日を含む)。`None`は制限なし。
    pub end: Option<NaiveDate>,
    /// 対象としたユーザー。空の場合は全員。
    pub users: Vec<String>,
    /// 読み込んだtime entryの件数。集計対象外となったものも含む。
    pub total_entries: u64,
    /// 集計対象外となったtime entryの件数。
    pub rejected: u64,
    pub created_at: DateTime<Utc>,
}

/// 保存する集計結果の1行。
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredGroup {
    #[serde(flatten)]
    key: AggregateKey,
    is_matched: bool,
    total_duration_seconds: u64,
    entry_count: u64,
    updated_at: DateTime<Utc>,
}

/// 1回の実行で保存した内容。
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredRun {
    #[serde(default)]
    info: Option<RunInfo>,
    #[serde(default)]
    groups: Vec<StoredGroup>,
}

/// 保存ファイルの内容。
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    runs: BTreeMap<String, StoredRun>,
}

/// 集計結果をJSONファイルに保存する。
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// 新しい`JsonStore`を返す。
    ///
    /// # Arguments
    ///
    /// * `data_dir` - 保存先のディレクトリ
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("aggregates.json"),
        }
    }

    fn read(&self) -> Result<StoreFile> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store at {}", self.path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to deserialize store at {}", self.path.display()))
    }

    fn write(&self, store: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(store).context("Failed to serialize store")?;

        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write store at {}", self.path.display()))
    }
}

impl AggregateStore for JsonStore {
    fn upsert_groups(&mut self, run_id: &str, groups: &[AggregateGroup]) -> Result<usize> {
        let mut store = self.read()?;
        let rows = &mut store.runs.entry(run_id.to_string()).or_default().groups;
        let updated_at = datetime::now();

        for group in groups {
            let row = StoredGroup {
                key: group.key.clone(),
                is_matched: group.key.is_matched(),
                total_duration_seconds: group.total_duration_seconds,
                entry_count: group.entry_count,
                updated_at,
            };
            match rows.iter_mut().find(|stored| stored.key == group.key) {
                Some(stored) => *stored = row,
                None => rows.push(row),
            }
        }

        self.write(&store)?;
        info!("Upserted {} groups for run {}", groups.len(), run_id);

        Ok(groups.len())
    }

    fn load_groups(&self, run_id: &str) -> Result<Vec<AggregateGroup>> {
        let store = self.read()?;
        let groups = store
            .runs
            .get(run_id)
            .map(|run| {
                run.groups
                    .iter()
                    .map(|row| AggregateGroup {
                        key: row.key.clone(),
                        total_duration_seconds: row.total_duration_seconds,
                        entry_count: row.entry_count,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(groups)
    }

    fn save_run(&mut self, run_id: &str, info: &RunInfo) -> Result<()> {
        let mut store = self.read()?;
        store.runs.entry(run_id.to_string()).or_default().info = Some(info.clone());

        self.write(&store)?;
        info!("Saved run {}", run_id);

        Ok(())
    }

    fn load_run(&self, run_id: &str) -> Result<Option<RunInfo>> {
        let store = self.read()?;

        Ok(store.runs.get(run_id).and_then(|run| run.info.clone()))
    }
}
