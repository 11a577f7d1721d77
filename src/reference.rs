use log::debug;
use serde::{Deserialize, Serialize};

/// description末尾から取り出したエンティティ参照。
///
/// `#1112 [Scrum] [Sub-bug] [Moneyball]`のように、末尾に並んだ番号とタグを参照として扱う。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedReference {
    /// 参照部分を取り除き、前後の空白を削除したdescription。
    pub clean_text: String,
    /// `#`を取り除いた数字のみのID。
    pub reference_id: Option<String>,
    /// 角括弧で囲まれたタグ。出現順(左から右)に並ぶ。
    pub tags: Vec<String>,
}

impl ParsedReference {
    /// IDが見つかった場合に`true`を返す。
    pub fn is_matched(&self) -> bool {
        self.reference_id.is_some()
    }

    /// タグを位置ごとの意味に割り当てる。
    pub fn tag_slots(&self) -> TagSlots {
        TagSlots::from_tags(&self.tags)
    }
}

/// タグの位置に意味を割り当てたもの。
///
/// 1番目がデータベース(カテゴリ)、2番目がタイプ、3番目がプロジェクト。4番目以降は使わない。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagSlots {
    pub category: Option<String>,
    pub kind: Option<String>,
    pub project: Option<String>,
}

impl TagSlots {
    /// タグ列から`TagSlots`を作る。
    pub fn from_tags(tags: &[String]) -> Self {
        if tags.len() > 3 {
            debug!("Ignoring extra tags: {:?}", &tags[3..]);
        }
        let mut slots = tags.iter().cloned();

        Self {
            category: slots.next(),
            kind: slots.next(),
            project: slots.next(),
        }
    }
}

/// 末尾部分を構成するトークン。
#[derive(Debug)]
enum Token<'a> {
    Reference(&'a str),
    Tag(&'a str),
}

/// descriptionを解析して参照を取り出す。
///
/// 解析は文字列の末尾から行う。本文中に`#`や角括弧が含まれていても、
/// 末尾に連続して並ぶタグと番号だけを参照として扱うため。
///
/// 末尾からトークンを1つずつ読み進め、タグでも番号でもないものが現れたところで止まる。
/// 2つ目の番号が現れた場合もそこで止まり、それより右側のトークンだけを使う。
/// つまり一番右の番号が採用され、それより左にある番号は本文の一部になる。
///
/// 参照が見つからない場合も失敗ではなく、`is_matched() == false`の結果を返す。
///
/// # Examples
///
/// ```
/// let parsed = parse("Research #5678 [Scrum]");
/// assert_eq!(parsed.clean_text, "Research");
/// assert_eq!(parsed.reference_id.as_deref(), Some("5678"));
/// ```
pub fn parse(text: &str) -> ParsedReference {
    let mut rest = text;
    let mut tokens = Vec::new();
    let mut has_reference = false;

    while let Some((head, token)) = split_last_token(rest.trim_end()) {
        if let Token::Reference(id) = token {
            if has_reference {
                debug!("Second reference #{} ends the tail of: {}", id, text);
                break;
            }
            has_reference = true;
        }
        tokens.push(token);
        rest = head;
    }

    if tokens.is_empty() {
        return ParsedReference {
            clean_text: text.trim().to_string(),
            ..Default::default()
        };
    }

    let mut reference_id = None;
    let mut tags = Vec::new();
    for token in tokens.into_iter().rev() {
        match token {
            Token::Reference(id) => reference_id = Some(id.to_string()),
            Token::Tag(tag) => tags.push(tag.to_string()),
        }
    }

    ParsedReference {
        clean_text: rest.trim().to_string(),
        reference_id,
        tags,
    }
}

/// 末尾のトークンを1つ切り出し、残りの文字列と共に返す。
fn split_last_token(s: &str) -> Option<(&str, Token<'_>)> {
    if let Some(inner) = s.strip_suffix(']') {
        let open = inner.rfind('[')?;
        let tag = &inner[open + 1..];
        if tag.is_empty() || tag.contains(']') {
            return None;
        }
        return Some((&inner[..open], Token::Tag(tag)));
    }

    let head = s.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &s[head.len()..];
    if digits.is_empty() {
        return None;
    }
    let head = head.strip_suffix('#')?;

    Some((head, Token::Reference(digits)))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{parse, ParsedReference, TagSlots};

    fn expected(clean_text: &str, reference_id: Option<&str>, tags: &[&str]) -> ParsedReference {
        ParsedReference {
            clean_text: clean_text.to_string(),
            reference_id: reference_id.map(str::to_string),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
        }
    }

    /// 正常系のテスト。
    #[rstest]
    #[case::full("work done #42 [A] [B] [C]", expected("work done", Some("42"), &["A", "B", "C"]))]
    #[case::non_english(
        "? Нет полей Stage, Next action, Owner, Alternate names #1112 [Scrum] [Sub-bug] [Moneyball]",
        expected(
            "? Нет полей Stage, Next action, Owner, Alternate names",
            Some("1112"),
            &["Scrum", "Sub-bug", "Moneyball"],
        ),
    )]
    #[case::no_metadata("Team standup meeting", expected("Team standup meeting", None, &[]))]
    #[case::id_only("Research #5678", expected("Research", Some("5678"), &[]))]
    #[case::empty("", expected("", None, &[]))]
    #[case::whitespace_only("   ", expected("", None, &[]))]
    #[case::tags_only("Some work [Backend] [Task]", expected("Some work", None, &["Backend", "Task"]))]
    #[case::tags_before_id("Fix [Backend] #7", expected("Fix", Some("7"), &["Backend"]))]
    #[case::no_whitespace("Fix#12[A][B]", expected("Fix", Some("12"), &["A", "B"]))]
    #[case::tail_only("#99 [Scrum]", expected("", Some("99"), &["Scrum"]))]
    #[case::trailing_whitespace("  Review #3 [X]  \t", expected("Review", Some("3"), &["X"]))]
    #[case::hash_in_body("Talk about C# and #hashtags #10", expected("Talk about C# and #hashtags", Some("10"), &[]))]
    #[case::bracket_in_body("[Draft] notes #8", expected("[Draft] notes", Some("8"), &[]))]
    #[case::number_without_hash("Release version 2", expected("Release version 2", None, &[]))]
    #[case::fullwidth_digits("Talk #１２", expected("Talk #１２", None, &[]))]
    #[case::fullwidth_digits_before_tag("Talk #１２ [Ops]", expected("Talk #１２", None, &["Ops"]))]
    #[case::hash_without_digits("Channel # [Ops]", expected("Channel #", None, &["Ops"]))]
    #[case::punctuation_in_tag("Deploy #1 [Ops: infra/k8s (prod)]", expected("Deploy", Some("1"), &["Ops: infra/k8s (prod)"]))]
    #[case::empty_brackets("Notes []", expected("Notes []", None, &[]))]
    #[case::unbalanced_bracket("Notes #4 [A]B]", expected("Notes #4 [A]B]", None, &[]))]
    #[case::text_after_tail("#12 [A] trailing words", expected("#12 [A] trailing words", None, &[]))]
    fn test_parse(#[case] input: &str, #[case] expected: ParsedReference) {
        assert_eq!(parse(input), expected);
    }

    /// 番号が2つ以上ある場合は一番右の番号が採用され、そこから左は本文になる。
    #[rstest]
    #[case::two_ids("Merge #1 #2", expected("Merge #1", Some("2"), &[]))]
    #[case::tags_after_broken_id(
        "Pair with #1 [X] #2 [Y]",
        expected("Pair with #1", Some("2"), &["X", "Y"]),
    )]
    #[case::tags_between_ids(
        "Sync #5 [A] [B] #6",
        expected("Sync #5", Some("6"), &["A", "B"]),
    )]
    fn test_parse_multiple_ids(#[case] input: &str, #[case] expected: ParsedReference) {
        assert_eq!(parse(input), expected);
    }

    #[rstest]
    #[case::with_id("Research #5678", true)]
    #[case::tags_only("Some work [Backend] [Task]", false)]
    #[case::nothing("Team meeting", false)]
    fn test_is_matched(#[case] input: &str, #[case] matched: bool) {
        assert_eq!(parse(input).is_matched(), matched);
    }

    /// 同じ入力に対しては常に同じ結果を返す。
    #[test]
    fn test_parse_is_idempotent() {
        let text = "Fixed bug #1234 [Backend] [Bug] [AuthService]";

        assert_eq!(parse(text), parse(text));
    }

    /// 記号を含まない文字列は前後の空白を除いてそのまま返る。
    #[rstest]
    #[case("plain text")]
    #[case("  leading and trailing  ")]
    #[case("日本語の説明")]
    fn test_parse_plain_text_round_trip(#[case] input: &str) {
        let parsed = parse(input);

        assert_eq!(parsed.clean_text, input.trim());
        assert!(!parsed.is_matched());
    }

    #[rstest]
    #[case::none(&[], TagSlots::default())]
    #[case::one(&["Scrum"], TagSlots { category: Some("Scrum".into()), kind: None, project: None })]
    #[case::three(
        &["Scrum", "Bug", "Moneyball"],
        TagSlots { category: Some("Scrum".into()), kind: Some("Bug".into()), project: Some("Moneyball".into()) },
    )]
    #[case::overflow(
        &["Scrum", "Bug", "Moneyball", "Extra"],
        TagSlots { category: Some("Scrum".into()), kind: Some("Bug".into()), project: Some("Moneyball".into()) },
    )]
    fn test_tag_slots(#[case] tags: &[&str], #[case] expected: TagSlots) {
        let tags: Vec<String> = tags.iter().map(|tag| tag.to_string()).collect();

        assert_eq!(TagSlots::from_tags(&tags), expected);
    }
}
