use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reference::{self, TagSlots};
use crate::time_entry::TimeEntry;

/// 集計のキー。
///
/// タグが無いことは`None`で表し、空文字列のタグとは区別する。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateKey {
    pub owner: String,
    pub clean_text: String,
    pub reference_id: Option<String>,
    #[serde(flatten)]
    pub tags: TagSlots,
}

impl AggregateKey {
    /// 番号付きの参照を持つキーの場合に`true`を返す。
    pub fn is_matched(&self) -> bool {
        self.reference_id.is_some()
    }
}

/// 同じキーを持つtime entryの合計。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateGroup {
    pub key: AggregateKey,
    pub total_duration_seconds: u64,
    pub entry_count: u64,
}

impl AggregateGroup {
    fn new(key: AggregateKey) -> Self {
        Self {
            key,
            total_duration_seconds: 0,
            entry_count: 0,
        }
    }

    /// 合計時間と件数を加える。桁あふれする場合は何も変更しない。
    fn absorb(&mut self, duration_seconds: u64, entry_count: u64) -> Result<(), RejectReason> {
        let total_duration_seconds = self
            .total_duration_seconds
            .checked_add(duration_seconds)
            .ok_or(RejectReason::DurationOverflow)?;
        let entry_count = self
            .entry_count
            .checked_add(entry_count)
            .ok_or(RejectReason::DurationOverflow)?;
        self.total_duration_seconds = total_duration_seconds;
        self.entry_count = entry_count;

        Ok(())
    }

    fn saturating_absorb(&mut self, duration_seconds: u64, entry_count: u64) {
        self.total_duration_seconds = self.total_duration_seconds.saturating_add(duration_seconds);
        self.entry_count = self.entry_count.saturating_add(entry_count);
    }
}

/// time entryを集計対象外とした理由。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("negative duration: {0} seconds")]
    NegativeDuration(i64),

    #[error("missing owner")]
    MissingOwner,

    #[error("total duration of the group overflows")]
    DurationOverflow,
}

/// 集計対象外となったtime entry。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub entry_id: i64,
    pub reason: RejectReason,
}

/// 1件のtime entryを集計に加えた結果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryOutcome {
    Contributed(AggregateKey),
    Rejected(RejectReason),
}

/// 1回の集計処理の結果。
///
/// `groups`はキーが最初に現れた順に並ぶ。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub groups: Vec<AggregateGroup>,
    pub rejections: Vec<Rejection>,
}

impl Aggregation {
    /// 別々に集計した結果を1つにまとめる。
    ///
    /// 同じキーのグループは合計時間と件数を足し合わせる。
    /// 所有者ごとに分割して集計した結果をまとめる場合などに使う。
    /// 合計が桁あふれする場合は上限値で止める。
    pub fn merge(self, other: Aggregation) -> Aggregation {
        let mut aggregator = Aggregator::new();
        aggregator.rejections = self.rejections;
        aggregator.rejections.extend(other.rejections);
        for group in self.groups.into_iter().chain(other.groups) {
            let merged = aggregator.group_mut(group.key);
            if merged
                .absorb(group.total_duration_seconds, group.entry_count)
                .is_err()
            {
                warn!("Saturated total of group: {:?}", merged.key);
                merged.saturating_absorb(group.total_duration_seconds, group.entry_count);
            }
        }

        aggregator.finish()
    }
}

/// time entryをキーごとに集計する。
///
/// # Examples
///
/// ```
/// let mut aggregator = Aggregator::new();
/// for entry in &entries {
///     aggregator.add(entry);
/// }
/// let aggregation = aggregator.finish();
/// ```
#[derive(Debug, Default)]
pub struct Aggregator {
    index: HashMap<AggregateKey, usize>,
    groups: Vec<AggregateGroup>,
    rejections: Vec<Rejection>,
}

impl Aggregator {
    /// 空の`Aggregator`を返す。
    pub fn new() -> Self {
        Self::default()
    }

    /// time entryを1件集計に加える。
    ///
    /// 不正なtime entryは集計せず、理由を記録して`EntryOutcome::Rejected`を返す。
    /// 処理を続けるか中断するかは呼び出し側が決める。
    /// グループの合計が桁あふれする場合も集計対象外とする。
    pub fn add(&mut self, entry: &TimeEntry) -> EntryOutcome {
        let key = match Self::key_for(entry) {
            Ok(key) => key,
            Err(reason) => return self.reject(entry, reason),
        };

        // 負の値はkey_forで弾いている
        let duration = entry.duration.unsigned_abs();
        // 新しいグループは合計0なので、桁あふれで空のグループが残ることはない
        if let Err(reason) = self.group_mut(key.clone()).absorb(duration, 1) {
            return self.reject(entry, reason);
        }

        EntryOutcome::Contributed(key)
    }

    fn reject(&mut self, entry: &TimeEntry, reason: RejectReason) -> EntryOutcome {
        warn!("Rejected time entry {}: {}", entry.id, reason);
        self.rejections.push(Rejection {
            entry_id: entry.id,
            reason: reason.clone(),
        });

        EntryOutcome::Rejected(reason)
    }

    /// 集計を終了し、結果を返す。
    pub fn finish(self) -> Aggregation {
        Aggregation {
            groups: self.groups,
            rejections: self.rejections,
        }
    }

    fn key_for(entry: &TimeEntry) -> Result<AggregateKey, RejectReason> {
        if entry.duration < 0 {
            return Err(RejectReason::NegativeDuration(entry.duration));
        }
        let owner = entry
            .owner
            .as_ref()
            .filter(|owner| !owner.trim().is_empty())
            .cloned()
            .ok_or(RejectReason::MissingOwner)?;
        let parsed = reference::parse(&entry.text);
        let tags = parsed.tag_slots();

        Ok(AggregateKey {
            owner,
            clean_text: parsed.clean_text,
            reference_id: parsed.reference_id,
            tags,
        })
    }

    fn group_mut(&mut self, key: AggregateKey) -> &mut AggregateGroup {
        let index = match self.index.get(&key).copied() {
            Some(index) => index,
            None => {
                self.groups.push(AggregateGroup::new(key.clone()));
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };

        &mut self.groups[index]
    }
}

/// time entryの一覧を集計する。
pub fn aggregate(entries: &[TimeEntry]) -> Aggregation {
    let mut aggregator = Aggregator::new();
    entries.iter().for_each(|entry| {
        aggregator.add(entry);
    });

    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    use super::{aggregate, AggregateKey, Aggregator, EntryOutcome, RejectReason, Rejection};
    use crate::reference::TagSlots;
    use crate::time_entry::TimeEntry;

    /// テスト用にダミーのTimeEntryを作成する。
    fn dummy_entry(id: i64, owner: Option<&str>, text: &str, duration: i64) -> TimeEntry {
        TimeEntry {
            id,
            owner: owner.map(str::to_string),
            text: text.to_string(),
            duration,
            start: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(), // 利用しないのでなんでも良い
            stop: None,                                                  // 利用しないのでなんでも良い
        }
    }

    fn key(owner: &str, clean_text: &str, reference_id: Option<&str>, tags: &[&str]) -> AggregateKey {
        let tags: Vec<String> = tags.iter().map(|tag| tag.to_string()).collect();
        AggregateKey {
            owner: owner.to_string(),
            clean_text: clean_text.to_string(),
            reference_id: reference_id.map(str::to_string),
            tags: TagSlots::from_tags(&tags),
        }
    }

    #[test]
    fn test_aggregate_empty() {
        let aggregation = aggregate(&[]);

        assert!(aggregation.groups.is_empty());
        assert!(aggregation.rejections.is_empty());
    }

    /// 同じキーのtime entryは合計時間と件数がまとめられる。
    #[test]
    fn test_aggregate_sums_same_key() {
        let entries = [
            dummy_entry(1, Some("a@example.com"), "Fix login #1234 [Scrum] [Bug] [Auth]", 1800),
            dummy_entry(2, Some("a@example.com"), "Fix login #1234 [Scrum] [Bug] [Auth]", 3600),
            dummy_entry(3, Some("a@example.com"), "  Fix login   #1234 [Scrum] [Bug] [Auth] ", 1),
        ];

        let aggregation = aggregate(&entries);

        assert_eq!(aggregation.groups.len(), 1);
        let group = &aggregation.groups[0];
        assert_eq!(group.key, key("a@example.com", "Fix login", Some("1234"), &["Scrum", "Bug", "Auth"]));
        assert_eq!(group.total_duration_seconds, 5401);
        assert_eq!(group.entry_count, 3);
        assert!(group.key.is_matched());
    }

    /// 所有者が異なれば、他が同じでも別のグループになる。
    #[test]
    fn test_aggregate_does_not_collapse_owners() {
        let entries = [
            dummy_entry(1, Some("a@example.com"), "Research #5678", 600),
            dummy_entry(2, Some("b@example.com"), "Research #5678", 600),
        ];

        let aggregation = aggregate(&entries);

        assert_eq!(aggregation.groups.len(), 2);
        assert_eq!(aggregation.groups[0].key.owner, "a@example.com");
        assert_eq!(aggregation.groups[1].key.owner, "b@example.com");
    }

    /// 参照の無いtime entryも捨てずに、本文ごとのグループになる。
    #[test]
    fn test_aggregate_keeps_unmatched_activity() {
        let entries = [
            dummy_entry(1, Some("a@example.com"), "Team standup meeting", 900),
            dummy_entry(2, Some("a@example.com"), "Team standup meeting", 900),
            dummy_entry(3, Some("a@example.com"), "Team standup meeting #77", 900),
            dummy_entry(4, Some("a@example.com"), "Team standup meeting [Ops]", 900),
        ];

        let aggregation = aggregate(&entries);

        let keys: Vec<_> = aggregation.groups.iter().map(|group| group.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                key("a@example.com", "Team standup meeting", None, &[]),
                key("a@example.com", "Team standup meeting", Some("77"), &[]),
                key("a@example.com", "Team standup meeting", None, &["Ops"]),
            ]
        );
        assert_eq!(aggregation.groups[0].total_duration_seconds, 1800);
        assert_eq!(aggregation.groups[0].entry_count, 2);
        assert!(!aggregation.groups[0].key.is_matched());
    }

    /// 4番目以降のタグはキーに含まれない。
    #[test]
    fn test_aggregate_ignores_overflow_tags() {
        let entries = [
            dummy_entry(1, Some("a@example.com"), "Work #1 [A] [B] [C] [D]", 60),
            dummy_entry(2, Some("a@example.com"), "Work #1 [A] [B] [C] [E]", 60),
        ];

        let aggregation = aggregate(&entries);

        assert_eq!(aggregation.groups.len(), 1);
        assert_eq!(aggregation.groups[0].entry_count, 2);
    }

    /// 不正なtime entryが1件あっても、残りは集計される。
    #[rstest]
    #[case::negative_duration(dummy_entry(3, Some("a@example.com"), "Running #9", -1700000000), RejectReason::NegativeDuration(-1700000000))]
    #[case::missing_owner(dummy_entry(3, None, "Research #9", 60), RejectReason::MissingOwner)]
    #[case::empty_owner(dummy_entry(3, Some(""), "Research #9", 60), RejectReason::MissingOwner)]
    #[case::blank_owner(dummy_entry(3, Some(" \t"), "Research #9", 60), RejectReason::MissingOwner)]
    fn test_aggregate_isolates_rejections(#[case] invalid: TimeEntry, #[case] reason: RejectReason) {
        let entries = [
            dummy_entry(1, Some("a@example.com"), "Research #9", 60),
            invalid,
            dummy_entry(2, Some("a@example.com"), "Research #9", 60),
        ];

        let aggregation = aggregate(&entries);

        assert_eq!(aggregation.groups.len(), 1);
        assert_eq!(aggregation.groups[0].entry_count, 2);
        assert_eq!(aggregation.groups[0].total_duration_seconds, 120);
        assert_eq!(aggregation.rejections, vec![Rejection { entry_id: 3, reason }]);
    }

    #[test]
    fn test_aggregator_add_reports_outcome() {
        let mut aggregator = Aggregator::new();

        let contributed = aggregator.add(&dummy_entry(1, Some("a@example.com"), "Research #5678", 60));
        let rejected = aggregator.add(&dummy_entry(2, Some("a@example.com"), "Research #5678", -5));

        assert_eq!(
            contributed,
            EntryOutcome::Contributed(key("a@example.com", "Research", Some("5678"), &[]))
        );
        assert_eq!(rejected, EntryOutcome::Rejected(RejectReason::NegativeDuration(-5)));
    }

    #[test]
    fn test_aggregate_zero_duration_counts_entry() {
        let aggregation = aggregate(&[dummy_entry(1, Some("a@example.com"), "Ping", 0)]);

        assert_eq!(aggregation.groups[0].total_duration_seconds, 0);
        assert_eq!(aggregation.groups[0].entry_count, 1);
    }

    /// 所有者ごとに分けて集計した結果をまとめても、一括で集計した結果と同じになる。
    #[test]
    fn test_merge_matches_single_pass() {
        let entries = vec![
            dummy_entry(1, Some("a@example.com"), "Research #5678", 60),
            dummy_entry(2, Some("b@example.com"), "Research #5678", 120),
            dummy_entry(3, Some("a@example.com"), "Research #5678", 180),
            dummy_entry(4, Some("b@example.com"), "Meeting", 240),
            dummy_entry(5, Some("a@example.com"), "Broken", -1),
        ];
        let (first, second) = entries.split_at(2);

        let merged = aggregate(first).merge(aggregate(second));
        let single = aggregate(&entries);

        let mut merged_groups = merged.groups.clone();
        let mut single_groups = single.groups.clone();
        merged_groups.sort_by(|a, b| a.key.cmp(&b.key));
        single_groups.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(merged_groups, single_groups);
        assert_eq!(merged.rejections, single.rejections);
    }

    #[test]
    fn test_reject_reason_display() {
        assert_eq!(RejectReason::NegativeDuration(-3).to_string(), "negative duration: -3 seconds");
        assert_eq!(RejectReason::MissingOwner.to_string(), "missing owner");
        assert_eq!(
            RejectReason::DurationOverflow.to_string(),
            "total duration of the group overflows"
        );
    }

    /// 合計が桁あふれするtime entryは集計対象外となり、それまでの合計は保たれる。
    #[test]
    fn test_aggregate_rejects_overflowing_entry() {
        let entries = [
            dummy_entry(1, Some("a@example.com"), "x #1", i64::MAX),
            dummy_entry(2, Some("a@example.com"), "x #1", i64::MAX),
            dummy_entry(3, Some("a@example.com"), "x #1", i64::MAX),
            dummy_entry(4, Some("a@example.com"), "y #2", i64::MAX),
        ];

        let aggregation = aggregate(&entries);

        assert_eq!(aggregation.groups.len(), 2);
        assert_eq!(aggregation.groups[0].total_duration_seconds, u64::MAX - 1);
        assert_eq!(aggregation.groups[0].entry_count, 2);
        assert_eq!(aggregation.groups[1].total_duration_seconds, i64::MAX as u64);
        assert_eq!(
            aggregation.rejections,
            vec![Rejection {
                entry_id: 3,
                reason: RejectReason::DurationOverflow,
            }]
        );
    }

    /// まとめた合計が桁あふれする場合は上限値で止める。
    #[test]
    fn test_merge_saturates_overflowing_group() {
        let entries = [
            dummy_entry(1, Some("a@example.com"), "x #1", i64::MAX),
            dummy_entry(2, Some("a@example.com"), "x #1", i64::MAX),
        ];

        let merged = aggregate(&entries).merge(aggregate(&entries));

        assert_eq!(merged.groups.len(), 1);
        assert_eq!(merged.groups[0].total_duration_seconds, u64::MAX);
        assert_eq!(merged.groups[0].entry_count, 4);
        assert!(merged.rejections.is_empty());
    }
}
