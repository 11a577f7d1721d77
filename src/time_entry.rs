use chrono::{DateTime, Utc};

/// 外部から取得した1件のtime entry。
///
/// `duration`はToggl側の値をそのまま信頼し、`start`/`stop`との整合性は検証しない。
#[derive(Clone, Debug, PartialEq)]
pub struct TimeEntry {
    pub id: i64,
    pub owner: Option<String>,
    pub text: String,
    pub duration: i64,
    pub start: DateTime<Utc>,
    pub stop: Option<DateTime<Utc>>,
}
