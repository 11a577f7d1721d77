use anyhow::{bail, Context, Result};
use log::info;

use crate::aggregate::AggregateGroup;
use crate::store::{AggregateStore, RunInfo};

/// 保存した集計結果を表示するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct ShowArgs {
    #[clap(short = 'r', long = "run-id", help = "Run identifier to show")]
    pub run_id: String,

    #[clap(
        short = 'u',
        long = "user",
        help = "Only show groups of this email (repeatable)"
    )]
    users: Vec<String>,
}

pub struct ShowCommand<'a, S: AggregateStore> {
    store: &'a S,
}

impl<'a, S: AggregateStore> ShowCommand<'a, S> {
    /// 新しい`ShowCommand`を返す。
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// `show`サブコマンドの処理を行う。
    ///
    /// 実行情報と集計結果を返す。実行情報も集計結果も保存されていない場合はエラーとする。
    /// ユーザーが指定された場合は、そのユーザーの集計結果だけを返す。大文字小文字は区別しない。
    pub fn run(&self, args: &ShowArgs) -> Result<(Option<RunInfo>, Vec<AggregateGroup>)> {
        let info = self
            .store
            .load_run(&args.run_id)
            .with_context(|| format!("Failed to load run {}", args.run_id))?;
        let groups = self
            .store
            .load_groups(&args.run_id)
            .with_context(|| format!("Failed to load groups of run {}", args.run_id))?;
        info!("length of stored groups: {}", groups.len());
        if info.is_none() && groups.is_empty() {
            bail!("Run {} not found", args.run_id);
        }

        if args.users.is_empty() {
            return Ok((info, groups));
        }
        let users: Vec<String> = args.users.iter().map(|user| user.to_lowercase()).collect();
        let groups = groups
            .into_iter()
            .filter(|group| users.contains(&group.key.owner.to_lowercase()))
            .collect();

        Ok((info, groups))
    }
}
