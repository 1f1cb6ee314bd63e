// 領収書ワークフローのエラー型

use super::models::ReceiptField;
use crate::shared::errors::{AppError, ErrorSeverity};
use std::collections::BTreeSet;
use thiserror::Error;

/// ストレージ操作のエラー
///
/// 「存在しない」「権限がない」「一時的な障害」を区別する
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("オブジェクトが見つかりません: {0}")]
    NotFound(String),

    #[error("ストレージへのアクセス権限がありません: {0}")]
    PermissionDenied(String),

    #[error("ストレージの一時的な障害: {0}")]
    Transient(String),

    #[error("ストレージエラー: {0}")]
    Other(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// 時間をおいて再試行すれば成功しうるか
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(path) => AppError::not_found(format!("ファイル（{path}）")),
            StorageError::PermissionDenied(details) => AppError::security(details),
            other => AppError::storage(other.to_string()),
        }
    }
}

/// 領収書の登録処理のエラー
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// 手動登録時に必須項目が欠けている
    #[error("必須項目が入力されていません: {}", format_fields(.missing))]
    IncompleteFields { missing: BTreeSet<ReceiptField> },

    /// リクエスト内容が不正
    #[error("不正なリクエストです: {0}")]
    InvalidRequest(String),

    /// S1: 領収書レコードの作成に失敗
    #[error("領収書レコードの作成に失敗しました: {0}")]
    RecordInsert(#[source] AppError),

    /// S2: 一時ファイルが存在しない
    #[error("一時ファイルが見つかりません: {temp_path}")]
    TempFileMissing { temp_path: String },

    /// S2: 一時ファイルの確認処理自体に失敗
    #[error("一時ファイルの確認に失敗しました: {0}")]
    StorageVerification(#[source] StorageError),

    /// S3: 恒久パスへの移動に失敗
    #[error("ファイルの移動に失敗しました: {0}")]
    StorageMove(#[source] StorageError),

    /// S4: 移動後のパス更新に失敗（自動では復旧しない）
    #[error(
        "領収書 {receipt_id} の画像パス更新に失敗しました（記録: {stale_image_path}, 実体: {permanent_path}）"
    )]
    ReconciliationNeeded {
        receipt_id: String,
        stale_image_path: String,
        permanent_path: String,
    },

    /// 登録処理以外のストレージ操作の失敗（一時アップロードなど）
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    App(#[from] AppError),
}

fn format_fields(fields: &BTreeSet<ReceiptField>) -> String {
    fields
        .iter()
        .map(ReceiptField::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl SubmissionError {
    /// ユーザーに表示するメッセージ
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::IncompleteFields { missing } => {
                let labels: Vec<&str> = missing
                    .iter()
                    .map(|field| match field {
                        ReceiptField::Date => "日付",
                        ReceiptField::Amount => "金額",
                        ReceiptField::Category => "カテゴリー",
                    })
                    .collect();
                format!("{}を確認して入力してください", labels.join("・"))
            }
            SubmissionError::InvalidRequest(msg) => msg.clone(),
            SubmissionError::RecordInsert(_) => {
                "領収書の保存に失敗しました。もう一度アップロードしてください".to_string()
            }
            SubmissionError::TempFileMissing { .. } | SubmissionError::StorageVerification(_) => {
                "アップロードしたファイルが見つかりません。もう一度アップロードしてください"
                    .to_string()
            }
            SubmissionError::StorageMove(_) => {
                "ファイルの保存に失敗しました。もう一度アップロードしてください".to_string()
            }
            SubmissionError::ReconciliationNeeded { receipt_id, .. } => format!(
                "領収書の登録処理を完了できませんでした。サポートにお問い合わせください（領収書ID: {receipt_id}）"
            ),
            SubmissionError::Storage(_) => {
                "ファイルのアップロードに失敗しました。もう一度お試しください".to_string()
            }
            SubmissionError::App(error) => error.user_message().to_string(),
        }
    }

    /// 同じ一時ファイルでは再試行できず、再アップロードが必要か
    pub fn requires_reupload(&self) -> bool {
        matches!(
            self,
            SubmissionError::RecordInsert(_)
                | SubmissionError::TempFileMissing { .. }
                | SubmissionError::StorageVerification(_)
                | SubmissionError::StorageMove(_)
        )
    }

    /// 管理者による手動修復が必要か
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, SubmissionError::ReconciliationNeeded { .. })
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SubmissionError::IncompleteFields { .. } | SubmissionError::InvalidRequest(_) => {
                ErrorSeverity::Low
            }
            SubmissionError::TempFileMissing { .. }
            | SubmissionError::StorageVerification(_)
            | SubmissionError::StorageMove(_)
            | SubmissionError::Storage(_) => ErrorSeverity::Medium,
            SubmissionError::RecordInsert(_) => ErrorSeverity::High,
            SubmissionError::ReconciliationNeeded { .. } => ErrorSeverity::Critical,
            SubmissionError::App(error) => error.severity(),
        }
    }
}

/// SubmissionErrorからStringへの変換（コマンド層での使用のため）
impl From<SubmissionError> for String {
    fn from(error: SubmissionError) -> Self {
        error.user_message()
    }
}

pub type SubmissionResult<T> = Result<T, SubmissionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_classification() {
        assert!(StorageError::NotFound("a".into()).is_not_found());
        assert!(!StorageError::Transient("a".into()).is_not_found());
        assert!(StorageError::Transient("a".into()).is_retryable());
        assert!(!StorageError::PermissionDenied("a".into()).is_retryable());
    }

    #[test]
    fn test_storage_error_into_app_error() {
        assert!(matches!(
            AppError::from(StorageError::NotFound("u1/a.png".into())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(StorageError::PermissionDenied("denied".into())),
            AppError::Security(_)
        ));
        assert!(matches!(
            AppError::from(StorageError::Transient("timeout".into())),
            AppError::Storage(_)
        ));
    }

    #[test]
    fn test_incomplete_fields_message() {
        let error = SubmissionError::IncompleteFields {
            missing: [ReceiptField::Category, ReceiptField::Date]
                .into_iter()
                .collect(),
        };

        assert_eq!(error.to_string(), "必須項目が入力されていません: date, category");
        assert_eq!(error.user_message(), "日付・カテゴリーを確認して入力してください");
        assert!(!error.requires_reupload());
    }

    #[test]
    fn test_reupload_and_reconciliation_flags() {
        let insert = SubmissionError::RecordInsert(AppError::Database("locked".into()));
        let missing = SubmissionError::TempFileMissing {
            temp_path: "u1/temp/a.png".into(),
        };
        let moved = SubmissionError::StorageMove(StorageError::Transient("timeout".into()));
        let reconcile = SubmissionError::ReconciliationNeeded {
            receipt_id: "r1".into(),
            stale_image_path: "u1/temp/a.png".into(),
            permanent_path: "u1/r1.png".into(),
        };

        assert!(insert.requires_reupload());
        assert!(missing.requires_reupload());
        assert!(moved.requires_reupload());
        assert!(!reconcile.requires_reupload());

        assert!(reconcile.needs_reconciliation());
        assert_eq!(reconcile.severity(), ErrorSeverity::Critical);
        assert!(reconcile.user_message().contains("サポート"));
        assert!(reconcile.user_message().contains("r1"));
    }

    #[test]
    fn test_app_error_message_passes_through() {
        let error = SubmissionError::from(AppError::validation("金額は0以上で入力してください"));
        assert_eq!(error.user_message(), "金額は0以上で入力してください");
        let message: String = error.into();
        assert_eq!(message, "金額は0以上で入力してください");
    }
}
