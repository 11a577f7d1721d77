use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;

use crate::time_entry::TimeEntry;

/// Togglのtime entryをデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct TogglTimeEntry {
    id: i64,
    description: Option<String>,
    user_email: Option<String>,
    start: String,
    stop: Option<String>,
    duration: i64,
}

/// time entryを取得するためのtrait。
#[cfg_attr(test, automock)]
pub trait TimeEntrySource {
    /// 指定された期間のタイムエントリーを取得する。
    ///
    /// # Arguments
    ///
    /// * `start_at` - 取得するタイムエントリーの開始日時。`None`の場合は制限しない
    /// * `end_at` - 取得するタイムエントリーの終了日時(この日時は含まない)。`None`の場合は制限しない
    fn read_time_entries(
        &self,
        start_at: Option<DateTime<Utc>>,
        end_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<TimeEntry>>;
}

/// Togglからエクスポートしたtime entryのJSONファイル。
///
/// # Examples
///
/// ```
/// let export = TogglExport::new("entries.json".into(), vec![]);
/// let time_entries = export.read_time_entries(Some(start_at), Some(end_at)).unwrap();
/// ```
pub struct TogglExport {
    path: PathBuf,
    users: Vec<String>,
}

impl TogglExport {
    /// 新しい`TogglExport`を返す。
    ///
    /// # Arguments
    ///
    /// * `path` - エクスポートしたJSONファイルのパス
    /// * `users` - 取得対象とするユーザーのメールアドレス。空の場合は全員を対象とする
    pub fn new(path: PathBuf, users: Vec<String>) -> Self {
        Self {
            path,
            users: users.iter().map(|user| user.to_lowercase()).collect(),
        }
    }

    /// 取得対象のユーザーか判定する。大文字小文字は区別しない。
    fn is_target_user(&self, entry: &TogglTimeEntry) -> bool {
        if self.users.is_empty() {
            return true;
        }
        entry
            .user_email
            .as_ref()
            .map(|email| self.users.contains(&email.to_lowercase()))
            .unwrap_or(false)
    }
}

impl TimeEntrySource for TogglExport {
    fn read_time_entries(
        &self,
        start_at: Option<DateTime<Utc>>,
        end_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<TimeEntry>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read Toggl export at {}", self.path.display()))?;
        let toggl_time_entries: Vec<TogglTimeEntry> =
            serde_json::from_str(&content).context("Failed to deserialize Toggl export")?;
        info!("length of time entries: {}", toggl_time_entries.len());

        let mut time_entries = Vec::new();
        for entry in toggl_time_entries {
            if !self.is_target_user(&entry) {
                continue;
            }
            let start = DateTime::parse_from_rfc3339(&entry.start)
                .with_context(|| format!("Failed to parse start of time entry {}", entry.id))?
                .to_utc();
            if start_at.map_or(false, |start_at| start < start_at)
                || end_at.map_or(false, |end_at| start >= end_at)
            {
                continue;
            }
            let stop = entry
                .stop
                .map(|stop| DateTime::parse_from_rfc3339(&stop).map(|stop| stop.to_utc()))
                .transpose()
                .with_context(|| format!("Failed to parse stop of time entry {}", entry.id))?;

            time_entries.push(TimeEntry {
                id: entry.id,
                owner: entry.user_email,
                text: entry.description.unwrap_or_default(),
                duration: entry.duration,
                start,
                stop,
            });
        }
        info!("length of target time entries: {}", time_entries.len());

        Ok(time_entries)
    }
}
