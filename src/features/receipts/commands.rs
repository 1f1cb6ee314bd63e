// 領収書機能のコマンドハンドラー
//
// 認証済みのリクエストコンテキストを受け取り、エラーはユーザー向けメッセージに変換して返す

use super::errors::SubmissionError;
use super::models::{
    ExtractionPreview, Receipt, ReceiptStatus, ReviewDecision, SubmitReceiptRequest, TempUpload,
    UpdateReceiptDto, UploadOutcome,
};
use crate::features::auth::RequestContext;
use crate::features::categories::Category;
use crate::shared::errors::{AppError, ErrorSeverity};
use crate::AppState;
use log::{error, info, warn};

/// 登録処理のエラーを記録し、ユーザー向けメッセージに変換する
fn report_submission_error(operation: &str, ctx: &RequestContext, error: SubmissionError) -> String {
    match error.severity() {
        ErrorSeverity::Low => {
            info!("{operation}: 入力の確認が必要です: user_id={}, error={error}", ctx.user_id)
        }
        ErrorSeverity::Medium => {
            warn!("{operation}失敗: user_id={}, error={error}", ctx.user_id)
        }
        ErrorSeverity::High | ErrorSeverity::Critical => {
            error!("{operation}失敗: user_id={}, error={error}", ctx.user_id)
        }
    }
    error.user_message()
}

fn report_app_error(operation: &str, ctx: &RequestContext, error: AppError) -> String {
    if error.severity() == ErrorSeverity::Low {
        info!("{operation}: user_id={}, error={error}", ctx.user_id);
    } else {
        error!("{operation}失敗: user_id={}, error={error}", ctx.user_id);
    }
    error.user_message().to_string()
}

/// ファイルを一時パスにアップロードする
pub async fn upload_temp_command(
    state: &AppState,
    ctx: &RequestContext,
    filename: String,
    bytes: Vec<u8>,
) -> Result<TempUpload, String> {
    info!(
        "一時アップロードを開始します: user_id={}, filename={filename}",
        ctx.user_id
    );

    state
        .receipt_service
        .upload_temp(ctx, &filename, bytes)
        .await
        .map_err(|e| report_submission_error("一時アップロード", ctx, e))
}

/// 一時ファイルの読み取りプレビュー
pub async fn preview_extraction_command(
    state: &AppState,
    ctx: &RequestContext,
    temp_path: String,
) -> Result<ExtractionPreview, String> {
    info!(
        "読み取りプレビューを開始します: user_id={}, temp_path={temp_path}",
        ctx.user_id
    );

    state
        .receipt_service
        .preview_extraction(ctx, &temp_path)
        .await
        .map_err(|e| report_submission_error("読み取りプレビュー", ctx, e))
}

/// アップロードから自動登録（または確認画面への誘導）まで
pub async fn process_upload_command(
    state: &AppState,
    ctx: &RequestContext,
    filename: String,
    bytes: Vec<u8>,
) -> Result<UploadOutcome, String> {
    info!(
        "領収書アップロード処理を開始します: user_id={}, filename={filename}, size={} bytes",
        ctx.user_id,
        bytes.len()
    );

    let outcome = state
        .receipt_service
        .process_upload(ctx, &filename, bytes)
        .await
        .map_err(|e| report_submission_error("領収書アップロード処理", ctx, e))?;

    match &outcome {
        UploadOutcome::AutoSubmitted { receipt } => {
            info!("領収書を自動登録しました: receipt_id={}", receipt.id)
        }
        UploadOutcome::NeedsConfirmation { preview } => {
            info!("確認が必要です: reason={}", preview.reason)
        }
    }
    Ok(outcome)
}

/// 確認画面からの登録
pub async fn submit_receipt_command(
    state: &AppState,
    ctx: &RequestContext,
    request: SubmitReceiptRequest,
) -> Result<Receipt, String> {
    info!(
        "領収書登録を開始します: user_id={}, temp_path={}",
        ctx.user_id, request.temp_path
    );

    let receipt = state
        .receipt_service
        .submit_receipt(ctx, request)
        .await
        .map_err(|e| report_submission_error("領収書登録", ctx, e))?;

    info!("領収書登録成功: receipt_id={}", receipt.id);
    Ok(receipt)
}

/// 領収書を編集する
pub fn edit_receipt_command(
    state: &AppState,
    ctx: &RequestContext,
    receipt_id: String,
    dto: UpdateReceiptDto,
) -> Result<Receipt, String> {
    state
        .receipt_service
        .edit_receipt(ctx, &receipt_id, dto)
        .map_err(|e| report_app_error("領収書編集", ctx, e))
}

/// 承認・却下（管理者）
pub fn review_receipt_command(
    state: &AppState,
    ctx: &RequestContext,
    receipt_id: String,
    decision: ReviewDecision,
) -> Result<Receipt, String> {
    state
        .receipt_service
        .review_receipt(ctx, &receipt_id, decision)
        .map_err(|e| report_app_error("領収書審査", ctx, e))
}

/// 個別に精算済みにする（管理者）
pub fn mark_reimbursed_command(
    state: &AppState,
    ctx: &RequestContext,
    receipt_id: String,
) -> Result<Receipt, String> {
    state
        .receipt_service
        .mark_reimbursed(ctx, &receipt_id)
        .map_err(|e| report_app_error("精算処理", ctx, e))
}

/// 承認済みを一括で精算済みにする（管理者）
pub fn bulk_reimburse_command(state: &AppState, ctx: &RequestContext) -> Result<usize, String> {
    state
        .receipt_service
        .bulk_reimburse(ctx)
        .map_err(|e| report_app_error("一括精算", ctx, e))
}

/// 要修復の領収書を修復する（管理者）
pub async fn reconcile_command(
    state: &AppState,
    ctx: &RequestContext,
    receipt_id: String,
    permanent_path: String,
) -> Result<Receipt, String> {
    info!(
        "領収書の修復を開始します: receipt_id={receipt_id}, permanent_path={permanent_path}"
    );

    state
        .receipt_service
        .reconcile(ctx, &receipt_id, &permanent_path)
        .await
        .map_err(|e| report_submission_error("領収書修復", ctx, e))
}

pub fn list_receipts_command(
    state: &AppState,
    ctx: &RequestContext,
    user_id: Option<String>,
) -> Result<Vec<Receipt>, String> {
    state
        .receipt_service
        .list_receipts(ctx, user_id.as_deref())
        .map_err(|e| report_app_error("領収書一覧取得", ctx, e))
}

pub fn list_receipts_by_status_command(
    state: &AppState,
    ctx: &RequestContext,
    status: ReceiptStatus,
) -> Result<Vec<Receipt>, String> {
    state
        .receipt_service
        .list_by_status(ctx, status)
        .map_err(|e| report_app_error("領収書一覧取得", ctx, e))
}

pub fn list_categories_command(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Vec<Category>, String> {
    state
        .receipt_service
        .list_categories()
        .map_err(|e| report_app_error("カテゴリー一覧取得", ctx, e))
}
