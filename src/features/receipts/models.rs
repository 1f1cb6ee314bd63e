// 領収書機能のデータモデル

use super::decision::DecisionReason;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 領収書のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Pending,
    Approved,
    Rejected,
    Reimbursed,
}

impl ReceiptStatus {
    /// データベース保存用の文字列
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Pending => "pending",
            ReceiptStatus::Approved => "approved",
            ReceiptStatus::Rejected => "rejected",
            ReceiptStatus::Reimbursed => "reimbursed",
        }
    }

    /// 社員・管理者による内容の編集が可能か
    pub fn is_editable(&self) -> bool {
        matches!(self, ReceiptStatus::Pending)
    }

    /// 管理者によるステータス遷移が許可されているか
    ///
    /// Pending → Approved / Rejected、Approved → Reimbursed のみ
    pub fn can_transition_to(&self, next: ReceiptStatus) -> bool {
        matches!(
            (self, next),
            (ReceiptStatus::Pending, ReceiptStatus::Approved)
                | (ReceiptStatus::Pending, ReceiptStatus::Rejected)
                | (ReceiptStatus::Approved, ReceiptStatus::Reimbursed)
        )
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReceiptStatus::Pending),
            "approved" => Ok(ReceiptStatus::Approved),
            "rejected" => Ok(ReceiptStatus::Rejected),
            "reimbursed" => Ok(ReceiptStatus::Reimbursed),
            other => Err(format!("不明なステータスです: {other}")),
        }
    }
}

/// 領収書データモデル（経費精算の申請1件）
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Receipt {
    pub id: String,
    pub user_id: String,
    pub receipt_date: NaiveDate,
    pub amount: Decimal,
    pub category_id: String,
    pub description: Option<String>,
    pub status: ReceiptStatus,
    pub image_path: String, // ストレージ上の画像/PDFの場所
    pub created_at: String,
    pub updated_at: String,
}

/// 領収書作成用DTO
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub user_id: String,
    pub receipt_date: NaiveDate,
    pub amount: Decimal,
    pub category_id: String,
    pub description: Option<String>,
    pub image_path: String,
}

/// 領収書更新用DTO
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateReceiptDto {
    pub receipt_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub category_id: Option<String>,
    /// 空文字（空白のみを含む）を指定すると説明を削除する
    pub description: Option<String>,
}

impl UpdateReceiptDto {
    pub fn is_empty(&self) -> bool {
        self.receipt_date.is_none()
            && self.amount.is_none()
            && self.category_id.is_none()
            && self.description.is_none()
    }
}

/// 領収書登録リクエスト（確認画面からの送信）
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReceiptRequest {
    pub temp_path: String,
    pub receipt_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub category_id: Option<String>,
    pub description: Option<String>,
}

/// 登録に必須の項目
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptField {
    Date,
    Amount,
    Category,
}

impl ReceiptField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptField::Date => "date",
            ReceiptField::Amount => "amount",
            ReceiptField::Category => "category",
        }
    }
}

impl fmt::Display for ReceiptField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 読み取りサービスが返した項目（各項目は独立して欠けうる、未検証のヒント）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub category_name: Option<String>,
}

impl ExtractedFields {
    /// すべての項目が欠けた読み取り結果（読み取り失敗時のフォールバック）
    pub fn empty() -> Self {
        Self::default()
    }
}

/// カテゴリー名をIDに解決した後の読み取り結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedExtraction {
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub category_id: Option<String>,
    /// 読み取られたカテゴリー名（解決できなかった場合の表示用）
    pub category_name: Option<String>,
}

/// 重複候補（同一ユーザー・同一日付・同一金額の既存領収書）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub id: String,
    pub description: Option<String>,
}

/// 重複の警告（登録は妨げない）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateWarning {
    pub candidates: Vec<DuplicateCandidate>,
}

impl DuplicateWarning {
    /// 重複候補があれば警告を作成
    pub fn from_candidates(candidates: &[DuplicateCandidate]) -> Option<Self> {
        if candidates.is_empty() {
            None
        } else {
            Some(Self {
                candidates: candidates.to_vec(),
            })
        }
    }

    /// 確認画面に表示するメッセージ
    pub fn message(&self) -> String {
        let descriptions: Vec<&str> = self
            .candidates
            .iter()
            .map(|c| c.description.as_deref().unwrap_or("（説明なし）"))
            .collect();
        format!(
            "同じ日付・金額の領収書が{}件登録されています: {}。別の経費の場合は説明を入力してください",
            self.candidates.len(),
            descriptions.join("、")
        )
    }
}

/// 読み取りプレビュー（確認画面用）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionPreview {
    pub temp_path: String,
    pub extracted: ResolvedExtraction,
    pub duplicates: Vec<DuplicateCandidate>,
    pub can_auto_submit: bool,
    pub reason: DecisionReason,
    /// 読み取りサービスが失敗し、空の結果にフォールバックしたか
    pub extraction_failed: bool,
}

impl ExtractionPreview {
    pub fn duplicate_warning(&self) -> Option<DuplicateWarning> {
        DuplicateWarning::from_candidates(&self.duplicates)
    }
}

/// アップロード処理の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// 自動登録済み
    AutoSubmitted { receipt: Receipt },
    /// ユーザーの確認が必要
    NeedsConfirmation { preview: ExtractionPreview },
}

/// 一時パスへのアップロード結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempUpload {
    pub temp_path: String,
    pub content_type: String,
    pub file_size: u64,
}

/// 管理者の審査結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn target_status(&self) -> ReceiptStatus {
        match self {
            ReviewDecision::Approve => ReceiptStatus::Approved,
            ReviewDecision::Reject => ReceiptStatus::Rejected,
        }
    }
}
