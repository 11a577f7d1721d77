use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat};

use crate::aggregate::{AggregateGroup, Rejection};
use crate::entity::EntityCatalog;
use crate::store::RunInfo;

/// Consoleに集計結果を表示するためのtrait。
pub trait ConsolePresenter {
    /// 集計結果を表示する。
    ///
    /// # Arguments
    ///
    /// * `groups` - 表示する集計結果
    /// * `rejections` - 集計対象外となったtime entry
    fn show_groups(&mut self, groups: &[AggregateGroup], rejections: &[Rejection]) -> Result<()>;

    /// 保存した実行の情報を表示する。
    fn show_run(&mut self, run_id: &str, info: &RunInfo) -> Result<()>;
}

/// 集計結果をユーザーごとにMarkdownのlist形式で表示する。
///
/// ユーザー内では合計時間の長い順に並べる。
pub struct ConsoleMarkdownList<'a, W: Write> {
    writer: &'a mut W,
    catalog: Option<&'a EntityCatalog>,
}

impl<'a, W: Write> ConsoleMarkdownList<'a, W> {
    /// 新しい`ConsoleMarkdownList`を返す。
    ///
    /// `catalog`が指定された場合は、参照先のエンティティ名も表示する。
    pub fn new(writer: &'a mut W, catalog: Option<&'a EntityCatalog>) -> Self {
        Self { writer, catalog }
    }

    /// 全ユーザーを通した件数を表示する。
    ///
    /// 参照先のあるグループはユーザーと番号、参照先の無いグループはユーザーと本文で数える。
    fn show_summary(&mut self, owners: usize, groups: &[AggregateGroup]) -> Result<()> {
        let mut matched = BTreeSet::new();
        let mut unmatched = BTreeSet::new();
        for group in groups {
            let key = &group.key;
            match &key.reference_id {
                Some(reference_id) => matched.insert((key.owner.as_str(), reference_id.as_str())),
                None => unmatched.insert((key.owner.as_str(), key.clean_text.as_str())),
            };
        }

        writeln!(self.writer, "## summary")?;
        writeln!(
            self.writer,
            "- users: {}, matched entities: {}, unmatched activities: {}",
            owners,
            matched.len(),
            unmatched.len()
        )
        .context("Failed to write summary")?;

        Ok(())
    }

    fn show_owner(&mut self, owner: &str, groups: &[&AggregateGroup]) -> Result<()> {
        let (matched, unmatched): (Vec<&AggregateGroup>, Vec<&AggregateGroup>) =
            groups.iter().copied().partition(|group| group.key.is_matched());

        writeln!(self.writer, "## {}", owner)?;
        writeln!(
            self.writer,
            "- total: {}h, matched: {}h ({} entries), unmatched: {}h ({} entries)",
            hours(seconds(groups)),
            hours(seconds(&matched)),
            entries(&matched),
            hours(seconds(&unmatched)),
            entries(&unmatched),
        )?;

        let mut sorted_groups = groups.to_vec();
        sorted_groups.sort_by(|a, b| b.total_duration_seconds.cmp(&a.total_duration_seconds));
        for group in sorted_groups {
            let description = self.describe(group);
            writeln!(
                self.writer,
                "- {}h ({}): {}",
                hours(group.total_duration_seconds),
                group.entry_count,
                description
            )
            .with_context(|| format!("Failed to write group: {:?}", group.key))?;
        }

        Ok(())
    }

    /// グループの本文と参照を1行にまとめる。
    fn describe(&self, group: &AggregateGroup) -> String {
        let key = &group.key;
        let mut parts = Vec::new();
        if !key.clean_text.is_empty() {
            parts.push(key.clean_text.clone());
        }
        if let Some(reference_id) = &key.reference_id {
            parts.push(format!("#{}", reference_id));
        }
        [&key.tags.category, &key.tags.kind, &key.tags.project]
            .into_iter()
            .flatten()
            .for_each(|tag| parts.push(format!("[{}]", tag)));

        let entity = key
            .reference_id
            .as_deref()
            .and_then(|reference_id| self.catalog?.get(reference_id));
        if let Some(entity) = entity {
            let labels: Vec<&str> = [entity.name(), entity.state()].into_iter().flatten().collect();
            if !labels.is_empty() {
                parts.push(format!("({})", labels.join(", ")));
            }
        }

        parts.join(" ")
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleMarkdownList<'a, W> {
    fn show_groups(&mut self, groups: &[AggregateGroup], rejections: &[Rejection]) -> Result<()> {
        let owners: BTreeMap<&str, Vec<&AggregateGroup>> =
            groups.iter().fold(BTreeMap::new(), |mut acc, group| {
                acc.entry(group.key.owner.as_str()).or_default().push(group);
                acc
            });
        if !owners.is_empty() {
            self.show_summary(owners.len(), groups)?;
        }
        for (owner, owner_groups) in owners {
            self.show_owner(owner, &owner_groups)
                .with_context(|| format!("Failed to write groups of {}", owner))?;
        }

        if !rejections.is_empty() {
            writeln!(self.writer, "## rejected")?;
            for rejection in rejections {
                writeln!(self.writer, "- {}: {}", rejection.entry_id, rejection.reason)
                    .with_context(|| format!("Failed to write rejection: {:?}", rejection))?;
            }
        }

        Ok(())
    }

    fn show_run(&mut self, run_id: &str, info: &RunInfo) -> Result<()> {
        let users = if info.users.is_empty() {
            "all".to_string()
        } else {
            info.users.join(", ")
        };

        writeln!(self.writer, "# run {}", run_id)?;
        writeln!(self.writer, "- period: {} ~ {}", day(info.start), day(info.end))?;
        writeln!(self.writer, "- users: {}", users)?;
        writeln!(self.writer, "- entries: {} (rejected: {})", info.total_entries, info.rejected)?;
        writeln!(
            self.writer,
            "- created at: {}",
            info.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
        .with_context(|| format!("Failed to write run {}", run_id))?;

        Ok(())
    }
}

/// 制限の無い日付は`-`とする。
fn day(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "-".to_string(), |date| date.to_string())
}

fn seconds(groups: &[&AggregateGroup]) -> u64 {
    groups.iter().map(|group| group.total_duration_seconds).sum()
}

fn entries(groups: &[&AggregateGroup]) -> u64 {
    groups.iter().map(|group| group.entry_count).sum()
}

/// 秒を時間単位の文字列にする。
fn hours(seconds: u64) -> String {
    format!("{:.2}", seconds as f64 / 3600.0)
}
