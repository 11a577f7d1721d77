use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::info;

use crate::aggregate::{aggregate, Aggregation};
use crate::datetime::{self, day_start, parse_date};
use crate::store::{AggregateStore, RunInfo};
use crate::toggl::TimeEntrySource;

/// 集計を行うためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct AggregateArgs {
    #[clap(
        short = 'i',
        long = "input",
        required = true,
        help = "Path to a JSON export of Toggl time entries (repeatable)"
    )]
    pub inputs: Vec<PathBuf>,

    #[clap(
        short = 's',
        long = "start",
        help = "First day to aggregate in the format YYYY-MM-DD",
        parse(try_from_str = parse_date),
    )]
    start: Option<NaiveDate>,

    #[clap(
        short = 'e',
        long = "end",
        help = "Last day to aggregate (inclusive) in the format YYYY-MM-DD",
        parse(try_from_str = parse_date),
    )]
    end: Option<NaiveDate>,

    #[clap(
        short = 'u',
        long = "user",
        help = "Only aggregate entries of this email (repeatable)"
    )]
    pub users: Vec<String>,

    #[clap(long = "entities", help = "Path to a cache of enriched entities (JSON)")]
    pub entities: Option<PathBuf>,

    #[clap(long = "run-id", help = "Run identifier used when saving")]
    run_id: Option<String>,

    #[clap(long = "save", help = "Save the aggregated groups")]
    save: bool,

    #[clap(long = "strict", help = "Fail when any time entry is rejected")]
    strict: bool,
}

impl AggregateArgs {
    /// `--strict`が指定されている場合、集計対象外のtime entryがあればエラーとする。
    pub fn check_rejections(&self, aggregation: &Aggregation) -> Result<()> {
        if self.strict && !aggregation.rejections.is_empty() {
            bail!(
                "{} time entries were rejected",
                aggregation.rejections.len()
            );
        }

        Ok(())
    }
}

pub struct AggregateCommand<'a, T: TimeEntrySource, S: AggregateStore> {
    sources: &'a [T],
    store: &'a mut S,
}

impl<'a, T: TimeEntrySource, S: AggregateStore> AggregateCommand<'a, T, S> {
    /// 新しい`AggregateCommand`を返す。
    ///
    /// # Arguments
    /// * `sources` - time entryの取得元
    /// * `store` - 集計結果の保存先
    pub fn new(sources: &'a [T], store: &'a mut S) -> Self {
        Self { sources, store }
    }

    /// `aggregate`サブコマンドの処理を行う。
    ///
    /// Localタイムゾーンで開始日の00:00:00から終了日の翌日00:00:00までに開始したtime entryを集計する。
    /// 日付が指定されていない側は制限しない。
    /// 取得元ごとに集計し、最後に同じキーのグループをまとめる。
    ///
    /// # Arguments
    ///
    /// * `args` - `aggregate`サブコマンドの引数
    pub fn run(&self, args: &AggregateArgs) -> Result<Aggregation> {
        if let (Some(start), Some(end)) = (args.start, args.end) {
            if start > end {
                bail!("Start date {} is after end date {}", start, end);
            }
        }
        let start_at = args.start.map(day_start).transpose()?;
        let end_at = match args.end {
            Some(end) => Some(day_start(end.succ_opt().context("Failed to get next day")?)?),
            None => None,
        };
        info!("Start at: {:?}, End at: {:?}", start_at, end_at);

        let mut aggregation = Aggregation::default();
        for (index, source) in self.sources.iter().enumerate() {
            let time_entries = source
                .read_time_entries(start_at, end_at)
                .with_context(|| format!("Failed to retrieve time entries from source {}", index))?;
            info!("Time entries retrieved successfully.");
            aggregation = aggregation.merge(aggregate(&time_entries));
        }
        info!(
            "Aggregated {} groups, rejected {} entries",
            aggregation.groups.len(),
            aggregation.rejections.len()
        );

        Ok(aggregation)
    }

    /// `--save`が指定されている場合に集計結果と実行情報を保存し、実行IDを返す。
    pub fn save(&mut self, args: &AggregateArgs, aggregation: &Aggregation) -> Result<Option<String>> {
        if !args.save {
            return Ok(None);
        }
        let run_id = args.run_id.clone().unwrap_or_else(datetime::run_id);
        let rejected = aggregation.rejections.len() as u64;
        let contributed = aggregation
            .groups
            .iter()
            .fold(0u64, |acc, group| acc.saturating_add(group.entry_count));
        let info = RunInfo {
            start: args.start,
            end: args.end,
            users: args.users.clone(),
            total_entries: contributed.saturating_add(rejected),
            rejected,
            created_at: datetime::now(),
        };

        self.store
            .upsert_groups(&run_id, &aggregation.groups)
            .with_context(|| format!("Failed to save groups of run {}", run_id))?;
        self.store
            .save_run(&run_id, &info)
            .with_context(|| format!("Failed to save run {}", run_id))?;

        Ok(Some(run_id))
    }
}
