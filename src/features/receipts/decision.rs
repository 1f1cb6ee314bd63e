// 自動登録の判定
//
// I/Oを一切行わない純粋関数。読み取り結果と重複候補だけから結果が決まる。

use super::models::{DuplicateCandidate, ReceiptField, ResolvedExtraction};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// 必須項目（日付・金額・カテゴリー）の充足状況
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldCompleteness {
    Complete {
        date: NaiveDate,
        amount: Decimal,
        category_id: String,
    },
    Incomplete {
        missing: BTreeSet<ReceiptField>,
    },
}

impl FieldCompleteness {
    pub fn assess(
        date: Option<NaiveDate>,
        amount: Option<Decimal>,
        category_id: Option<&str>,
    ) -> Self {
        match (date, amount, category_id) {
            (Some(date), Some(amount), Some(category_id)) => FieldCompleteness::Complete {
                date,
                amount,
                category_id: category_id.to_string(),
            },
            (date, amount, category_id) => {
                let mut missing = BTreeSet::new();
                if date.is_none() {
                    missing.insert(ReceiptField::Date);
                }
                if amount.is_none() {
                    missing.insert(ReceiptField::Amount);
                }
                if category_id.is_none() {
                    missing.insert(ReceiptField::Category);
                }
                FieldCompleteness::Incomplete { missing }
            }
        }
    }

    pub fn from_extraction(extracted: &ResolvedExtraction) -> Self {
        Self::assess(
            extracted.date,
            extracted.amount,
            extracted.category_id.as_deref(),
        )
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, FieldCompleteness::Complete { .. })
    }

    /// 判定順（日付 → 金額 → カテゴリー）で最初に欠けている項目
    pub fn first_missing(&self) -> Option<ReceiptField> {
        match self {
            FieldCompleteness::Complete { .. } => None,
            FieldCompleteness::Incomplete { missing } => missing.iter().next().copied(),
        }
    }
}

/// 判定理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    Incomplete(ReceiptField),
    Duplicate,
    Complete,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::Incomplete(field) => write!(f, "incomplete:{field}"),
            DecisionReason::Duplicate => f.write_str("duplicate"),
            DecisionReason::Complete => f.write_str("complete"),
        }
    }
}

impl Serialize for DecisionReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmissionDecision {
    pub can_auto_submit: bool,
    pub reason: DecisionReason,
}

/// 自動登録できるか判定する
///
/// 1. 日付がない → incomplete:date
/// 2. 金額がない → incomplete:amount
/// 3. カテゴリーIDがない → incomplete:category
/// 4. 重複候補がある → duplicate
/// 5. それ以外 → complete（自動登録）
pub fn decide(
    extracted: &ResolvedExtraction,
    duplicates: &[DuplicateCandidate],
) -> SubmissionDecision {
    let completeness = FieldCompleteness::from_extraction(extracted);

    let reason = match completeness.first_missing() {
        Some(field) => DecisionReason::Incomplete(field),
        None if !duplicates.is_empty() => DecisionReason::Duplicate,
        None => DecisionReason::Complete,
    };

    SubmissionDecision {
        can_auto_submit: reason == DecisionReason::Complete,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::str::FromStr;

    fn extraction(
        date: Option<&str>,
        amount: Option<&str>,
        category_id: Option<&str>,
    ) -> ResolvedExtraction {
        ResolvedExtraction {
            date: date.map(|d| NaiveDate::from_str(d).unwrap()),
            amount: amount.map(|a| Decimal::from_str(a).unwrap()),
            category_id: category_id.map(str::to_string),
            category_name: None,
        }
    }

    fn candidates(count: usize) -> Vec<DuplicateCandidate> {
        (0..count)
            .map(|i| DuplicateCandidate {
                id: format!("r{i}"),
                description: None,
            })
            .collect()
    }

    /// 任意の値から読み取り結果を組み立てる
    fn arbitrary_extraction(
        day: Option<u8>,
        cents: Option<u32>,
        category: Option<bool>,
    ) -> ResolvedExtraction {
        ResolvedExtraction {
            date: day.and_then(|d| NaiveDate::from_ymd_opt(2024, 1, u32::from(d % 28) + 1)),
            amount: cents.map(|c| Decimal::new(i64::from(c), 2)),
            category_id: category.map(|travel| {
                let id = if travel { "travel" } else { "meals" };
                id.to_string()
            }),
            category_name: None,
        }
    }

    #[test]
    fn test_complete_without_duplicates_auto_submits() {
        let decision = decide(
            &extraction(Some("2024-03-01"), Some("42.50"), Some("cat-1")),
            &[],
        );
        assert!(decision.can_auto_submit);
        assert_eq!(decision.reason, DecisionReason::Complete);
        assert_eq!(decision.reason.to_string(), "complete");
    }

    #[test]
    fn test_missing_amount_is_reported() {
        let decision = decide(
            &extraction(Some("2024-03-01"), None, Some("cat-1")),
            &candidates(1),
        );
        assert!(!decision.can_auto_submit);
        assert_eq!(decision.reason.to_string(), "incomplete:amount");
    }

    #[test]
    fn test_rule_order() {
        let all_missing = decide(&extraction(None, None, None), &candidates(2));
        assert_eq!(all_missing.reason.to_string(), "incomplete:date");

        let no_category = decide(
            &extraction(Some("2024-03-01"), Some("1"), None),
            &candidates(2),
        );
        assert_eq!(no_category.reason.to_string(), "incomplete:category");

        let duplicate = decide(
            &extraction(Some("2024-03-01"), Some("1"), Some("cat-1")),
            &candidates(2),
        );
        assert_eq!(duplicate.reason.to_string(), "duplicate");
        assert!(!duplicate.can_auto_submit);
    }

    #[test]
    fn test_completeness_lists_all_missing_fields() {
        let completeness = FieldCompleteness::assess(None, Some(Decimal::ONE), None);
        match completeness {
            FieldCompleteness::Incomplete { ref missing } => {
                assert_eq!(
                    missing.iter().copied().collect::<Vec<_>>(),
                    vec![ReceiptField::Date, ReceiptField::Category]
                );
            }
            FieldCompleteness::Complete { .. } => panic!("expected incomplete"),
        }
        assert_eq!(completeness.first_missing(), Some(ReceiptField::Date));
    }

    #[test]
    fn test_reason_serializes_as_tag() {
        let decision = decide(&extraction(Some("2024-03-01"), None, None), &[]);
        let json = serde_json::to_string(&decision).unwrap();
        assert_eq!(
            json,
            r#"{"can_auto_submit":false,"reason":"incomplete:amount"}"#
        );
    }

    #[quickcheck]
    fn prop_decision_is_deterministic(
        day: Option<u8>,
        cents: Option<u32>,
        category: Option<bool>,
        duplicate_count: u8,
    ) -> bool {
        let extracted = arbitrary_extraction(day, cents, category);
        let duplicates = candidates(usize::from(duplicate_count % 4));
        decide(&extracted, &duplicates) == decide(&extracted.clone(), &duplicates.clone())
    }

    #[quickcheck]
    fn prop_incomplete_never_auto_submits(
        day: Option<u8>,
        cents: Option<u32>,
        category: Option<bool>,
        duplicate_count: u8,
    ) -> bool {
        let extracted = arbitrary_extraction(day, cents, category);
        let duplicates = candidates(usize::from(duplicate_count % 4));
        let decision = decide(&extracted, &duplicates);

        let incomplete =
            extracted.date.is_none() || extracted.amount.is_none() || extracted.category_id.is_none();
        if incomplete {
            !decision.can_auto_submit && matches!(decision.reason, DecisionReason::Incomplete(_))
        } else {
            !matches!(decision.reason, DecisionReason::Incomplete(_))
        }
    }

    #[quickcheck]
    fn prop_duplicates_gate_complete_fields(day: u8, cents: u32, duplicate_count: u8) -> bool {
        let extracted = arbitrary_extraction(Some(day), Some(cents), Some(true));
        let count = usize::from(duplicate_count % 4);
        let decision = decide(&extracted, &candidates(count));

        if count == 0 {
            decision.can_auto_submit && decision.reason == DecisionReason::Complete
        } else {
            !decision.can_auto_submit && decision.reason == DecisionReason::Duplicate
        }
    }

    #[quickcheck]
    fn prop_can_auto_submit_matches_reason(
        day: Option<u8>,
        cents: Option<u32>,
        category: Option<bool>,
        duplicate_count: u8,
    ) -> bool {
        let extracted = arbitrary_extraction(day, cents, category);
        let decision = decide(&extracted, &candidates(usize::from(duplicate_count % 4)));
        decision.can_auto_submit == (decision.reason == DecisionReason::Complete)
    }
}
