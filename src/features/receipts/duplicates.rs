// 重複チェック

use super::models::DuplicateCandidate;
use super::repository::ReceiptRepository;
use crate::shared::errors::AppResult;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// 同一ユーザー・同一日付・同一金額の既存領収書を探す
///
/// 日付か金額のどちらかが欠けている場合は問い合わせを行わず空を返す
pub fn find_duplicates(
    repository: &dyn ReceiptRepository,
    user_id: &str,
    date: Option<NaiveDate>,
    amount: Option<Decimal>,
) -> AppResult<Vec<DuplicateCandidate>> {
    let (Some(date), Some(amount)) = (date, amount) else {
        log::debug!("日付または金額がないため重複チェックを省略します: user_id={user_id}");
        return Ok(Vec::new());
    };

    let candidates = repository.find_duplicates(user_id, date, amount)?;

    if !candidates.is_empty() {
        log::info!(
            "重複候補が見つかりました: user_id={user_id}, date={date}, amount={amount}, count={}",
            candidates.len()
        );
    }

    Ok(candidates)
}
