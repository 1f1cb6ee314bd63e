// 領収書の二段階コミット
//
// S0 一時アップロード済み → S1 レコード作成 → S2 一時ファイル確認
//   → S3 恒久パスへ移動 → S4 画像パス確定
//
// どの時点でも「この試行のレコードが存在しない」か「レコードが1件存在し、
// image_pathが実在するファイルを指している」のどちらか。例外はS3→S4の失敗で、
// その場合は要修復としてエラーを返す。

use super::errors::{SubmissionError, SubmissionResult};
use super::models::{NewReceipt, Receipt};
use super::paths::ReceiptPaths;
use super::repository::ReceiptRepository;
use super::storage::{object_exists, ReceiptStorage};
use chrono::NaiveDate;
use log::{error, info, warn};
use rust_decimal::Decimal;
use std::fmt;

/// コミット処理の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// S0: 一時パスにアップロード済み（この処理の入力）
    UploadedTemp,
    /// S1: image_pathに一時パスを入れてレコードを作成済み
    RecordInserted,
    /// S2: 一時ファイルの存在を確認済み
    TempVerified,
    /// S3: 恒久パスへ移動済み
    Moved,
    /// S4: image_pathを恒久パスに更新済み（完了）
    Finalized,
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CommitState::UploadedTemp => "S0:uploaded-temp",
            CommitState::RecordInserted => "S1:record-inserted",
            CommitState::TempVerified => "S2:temp-verified",
            CommitState::Moved => "S3:moved",
            CommitState::Finalized => "S4:finalized",
        };
        f.write_str(label)
    }
}

/// 遷移失敗時の補償処理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// 一時ファイルを削除する（失敗してもログのみ）
    RemoveTempObject,
    /// 作成したレコードを削除する
    DeleteRecord,
    /// 自動では戻さず、要修復として報告する
    FlagReconciliation,
}

/// 補償表: 遷移先の状態 → その遷移に失敗したときの補償
pub const COMPENSATION_TABLE: &[(CommitState, Compensation)] = &[
    (CommitState::RecordInserted, Compensation::RemoveTempObject),
    (CommitState::TempVerified, Compensation::DeleteRecord),
    (CommitState::Moved, Compensation::DeleteRecord),
    (CommitState::Finalized, Compensation::FlagReconciliation),
];

/// 遷移先の状態に対応する補償処理
pub fn compensation_for(target: CommitState) -> Option<Compensation> {
    COMPENSATION_TABLE
        .iter()
        .find(|(state, _)| *state == target)
        .map(|(_, compensation)| *compensation)
}

/// コミット処理の入力（必須項目はすべて確定済み）
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub user_id: String,
    pub temp_path: String,
    pub receipt_date: NaiveDate,
    pub amount: Decimal,
    pub category_id: String,
    pub description: Option<String>,
}

/// 1回の登録試行を表すコミット処理
///
/// 失敗時はやり直さず、再アップロードしてから新しい試行を行う
pub struct ReceiptCommit<'a> {
    repository: &'a dyn ReceiptRepository,
    storage: &'a dyn ReceiptStorage,
    state: CommitState,
    compensations: Vec<Compensation>,
    started: bool,
}

impl<'a> ReceiptCommit<'a> {
    pub fn new(repository: &'a dyn ReceiptRepository, storage: &'a dyn ReceiptStorage) -> Self {
        Self {
            repository,
            storage,
            state: CommitState::UploadedTemp,
            compensations: Vec::new(),
            started: false,
        }
    }

    /// 最後に到達した状態
    pub fn state(&self) -> CommitState {
        self.state
    }

    /// 実行した補償処理
    pub fn compensations(&self) -> &[Compensation] {
        &self.compensations
    }

    fn advance(&mut self, next: CommitState, detail: &str) {
        info!("領収書コミット: {} -> {next} ({detail})", self.state);
        self.state = next;
    }

    pub async fn run(&mut self, request: &CommitRequest) -> SubmissionResult<Receipt> {
        // 失敗して状態が進まなかった場合も再実行は不可
        if self.started {
            return Err(SubmissionError::InvalidRequest(
                "コミット処理は一度しか実行できません".to_string(),
            ));
        }
        self.started = true;

        let temp_path = request.temp_path.as_str();
        if temp_path.trim().is_empty() {
            return Err(SubmissionError::InvalidRequest(
                "一時パスが指定されていません".to_string(),
            ));
        }

        // S0 → S1
        let new_receipt = NewReceipt {
            user_id: request.user_id.clone(),
            receipt_date: request.receipt_date,
            amount: request.amount,
            category_id: request.category_id.clone(),
            description: request.description.clone(),
            image_path: temp_path.to_string(),
        };

        let receipt = match self.repository.insert(&new_receipt) {
            Ok(receipt) => receipt,
            Err(e) => {
                error!("領収書レコードの作成に失敗しました: user_id={}, error={e}", request.user_id);
                self.compensate(CommitState::RecordInserted, None, temp_path)
                    .await;
                return Err(SubmissionError::RecordInsert(e));
            }
        };
        self.advance(CommitState::RecordInserted, &format!("receipt_id={}", receipt.id));

        // S1 → S2
        match object_exists(self.storage, temp_path).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("一時ファイルが見つかりません: {temp_path}");
                self.compensate(CommitState::TempVerified, Some(&receipt.id), temp_path)
                    .await;
                return Err(SubmissionError::TempFileMissing {
                    temp_path: temp_path.to_string(),
                });
            }
            Err(e) => {
                warn!("一時ファイルの確認に失敗しました: {temp_path}, error={e}");
                self.compensate(CommitState::TempVerified, Some(&receipt.id), temp_path)
                    .await;
                return Err(SubmissionError::StorageVerification(e));
            }
        }
        self.advance(CommitState::TempVerified, temp_path);

        // S2 → S3
        let permanent_path =
            match ReceiptPaths::permanent_path(&request.user_id, &receipt.id, temp_path) {
                Ok(path) => path,
                Err(e) => {
                    self.compensate(CommitState::Moved, Some(&receipt.id), temp_path)
                        .await;
                    return Err(SubmissionError::App(e));
                }
            };

        if let Err(e) = self.storage.move_object(temp_path, &permanent_path).await {
            warn!("ファイルの移動に失敗しました: {temp_path} -> {permanent_path}, error={e}");
            self.compensate(CommitState::Moved, Some(&receipt.id), temp_path)
                .await;
            return Err(SubmissionError::StorageMove(e));
        }
        self.advance(CommitState::Moved, &permanent_path);

        // S3 → S4
        match self
            .repository
            .update_image_path(&receipt.id, &permanent_path)
        {
            Ok(finalized) => {
                self.advance(CommitState::Finalized, &permanent_path);
                Ok(finalized)
            }
            Err(e) => {
                error!(
                    "画像パスの更新に失敗しました: receipt_id={}, error={e}",
                    receipt.id
                );
                self.compensate(CommitState::Finalized, Some(&receipt.id), temp_path)
                    .await;
                Err(SubmissionError::ReconciliationNeeded {
                    receipt_id: receipt.id,
                    stale_image_path: temp_path.to_string(),
                    permanent_path,
                })
            }
        }
    }

    /// 補償処理を行う。補償自体の失敗はログに残すだけで呼び出し元には返さない
    async fn compensate(&mut self, target: CommitState, receipt_id: Option<&str>, temp_path: &str) {
        let Some(compensation) = compensation_for(target) else {
            return;
        };
        self.compensations.push(compensation);

        match compensation {
            Compensation::RemoveTempObject => {
                warn!("補償処理: 一時ファイルを削除します: {temp_path}");
                if let Err(e) = self.storage.remove(temp_path).await {
                    error!("一時ファイルの削除に失敗しました（孤立ファイル）: {temp_path}, error={e}");
                }
            }
            Compensation::DeleteRecord => {
                let Some(receipt_id) = receipt_id else { return };
                warn!("補償処理: 領収書レコードを削除します: receipt_id={receipt_id}");
                if let Err(e) = self.repository.delete(receipt_id) {
                    error!("領収書レコードの削除に失敗しました: receipt_id={receipt_id}, error={e}");
                }
            }
            Compensation::FlagReconciliation => {
                error!(
                    "要修復: 領収書 {} の画像は移動済みですが、レコードは一時パス {temp_path} を指しています",
                    receipt_id.unwrap_or("-")
                );
            }
        }
    }
}
