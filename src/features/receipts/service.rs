// 領収書ワークフローのサービス層

use super::commit::{CommitRequest, ReceiptCommit};
use super::decision::{decide, FieldCompleteness};
use super::duplicates::find_duplicates;
use super::errors::{StorageError, SubmissionError, SubmissionResult};
use super::extraction::ReceiptExtractor;
use super::models::{
    ExtractedFields, ExtractionPreview, Receipt, ReceiptStatus, ResolvedExtraction,
    ReviewDecision, SubmitReceiptRequest, TempUpload, UpdateReceiptDto, UploadOutcome,
};
use super::paths::ReceiptPaths;
use super::repository::ReceiptRepository;
use super::storage::{object_exists, ReceiptStorage};
use crate::features::auth::RequestContext;
use crate::features::categories::{Category, CategoryLookup};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{
    get_content_type, normalize_description, validate_amount, validate_description,
    validate_file_format, validate_file_size,
};
use log::{info, warn};
use std::sync::Arc;

/// 領収書の登録・審査を扱うサービス
#[derive(Clone)]
pub struct ReceiptService {
    repository: Arc<dyn ReceiptRepository>,
    categories: Arc<dyn CategoryLookup>,
    storage: Arc<dyn ReceiptStorage>,
    extractor: Arc<dyn ReceiptExtractor>,
}

/// 検証エラーは不正なリクエストとして扱う
fn invalid_request(error: AppError) -> SubmissionError {
    match error {
        AppError::Validation(message) => SubmissionError::InvalidRequest(message),
        other => SubmissionError::App(other),
    }
}

impl ReceiptService {
    pub fn new(
        repository: Arc<dyn ReceiptRepository>,
        categories: Arc<dyn CategoryLookup>,
        storage: Arc<dyn ReceiptStorage>,
        extractor: Arc<dyn ReceiptExtractor>,
    ) -> Self {
        Self {
            repository,
            categories,
            storage,
            extractor,
        }
    }

    /// ファイルを一時パスにアップロードする
    ///
    /// # 引数
    /// * `ctx` - リクエストコンテキスト
    /// * `filename` - 元のファイル名（拡張子の判定に使用）
    /// * `bytes` - ファイルの内容
    pub async fn upload_temp(
        &self,
        ctx: &RequestContext,
        filename: &str,
        bytes: Vec<u8>,
    ) -> SubmissionResult<TempUpload> {
        let extension = validate_file_format(filename).map_err(invalid_request)?;
        let file_size = bytes.len() as u64;
        validate_file_size(file_size).map_err(invalid_request)?;

        let temp_path = ReceiptPaths::temp_path(&ctx.user_id, &extension);
        let content_type = get_content_type(&temp_path);

        self.storage.upload(&temp_path, bytes, content_type).await?;

        info!(
            "一時ファイルをアップロードしました: user_id={}, path={temp_path}, size={file_size}",
            ctx.user_id
        );

        Ok(TempUpload {
            temp_path,
            content_type: content_type.to_string(),
            file_size,
        })
    }

    /// 一時ファイルを読み取り、確認画面用のプレビューを作成する
    ///
    /// 読み取りサービスの失敗は空の読み取り結果として扱い、手動確認へ回す
    pub async fn preview_extraction(
        &self,
        ctx: &RequestContext,
        temp_path: &str,
    ) -> SubmissionResult<ExtractionPreview> {
        ReceiptPaths::validate_temp_path(&ctx.user_id, temp_path).map_err(invalid_request)?;

        let image = self.storage.download(temp_path).await.map_err(|e| match e {
            StorageError::NotFound(_) => SubmissionError::TempFileMissing {
                temp_path: temp_path.to_string(),
            },
            other => SubmissionError::Storage(other),
        })?;

        let media_type = get_content_type(temp_path);
        let (fields, extraction_failed) = match self.extractor.extract(&image, media_type).await {
            Ok(fields) => (fields, false),
            Err(e) => {
                warn!("読み取りに失敗したため手動確認に切り替えます: path={temp_path}, error={e}");
                (ExtractedFields::empty(), true)
            }
        };

        let extracted = self.resolve_extraction(fields)?;
        let duplicates = find_duplicates(
            self.repository.as_ref(),
            &ctx.user_id,
            extracted.date,
            extracted.amount,
        )?;
        let decision = decide(&extracted, &duplicates);

        info!(
            "読み取り判定: user_id={}, path={temp_path}, reason={}",
            ctx.user_id, decision.reason
        );

        Ok(ExtractionPreview {
            temp_path: temp_path.to_string(),
            extracted,
            duplicates,
            can_auto_submit: decision.can_auto_submit,
            reason: decision.reason,
            extraction_failed,
        })
    }

    /// 読み取ったカテゴリー名をIDに解決する
    ///
    /// 読み取り結果は未検証のため、不正な金額は読み取れなかったものとして扱う
    fn resolve_extraction(&self, fields: ExtractedFields) -> AppResult<ResolvedExtraction> {
        let category_id = match fields.category_name.as_deref() {
            Some(name) => self.categories.resolve_category(name)?,
            None => None,
        };

        let amount = fields.amount.filter(|amount| match validate_amount(*amount) {
            Ok(()) => true,
            Err(e) => {
                warn!("読み取った金額を破棄します: amount={amount}, error={e}");
                false
            }
        });

        Ok(ResolvedExtraction {
            date: fields.date,
            amount,
            category_id,
            category_name: fields.category_name,
        })
    }

    /// アップロードから判定までを行い、可能なら自動登録する
    pub async fn process_upload(
        &self,
        ctx: &RequestContext,
        filename: &str,
        bytes: Vec<u8>,
    ) -> SubmissionResult<UploadOutcome> {
        let upload = self.upload_temp(ctx, filename, bytes).await?;
        let preview = self.preview_extraction(ctx, &upload.temp_path).await?;

        if !preview.can_auto_submit {
            return Ok(UploadOutcome::NeedsConfirmation { preview });
        }

        let (Some(receipt_date), Some(amount), Some(category_id)) = (
            preview.extracted.date,
            preview.extracted.amount,
            preview.extracted.category_id.clone(),
        ) else {
            return Ok(UploadOutcome::NeedsConfirmation { preview });
        };

        let request = CommitRequest {
            user_id: ctx.user_id.clone(),
            temp_path: upload.temp_path,
            receipt_date,
            amount,
            category_id,
            description: None,
        };

        let receipt = self.commit(&request).await?;
        info!(
            "領収書を自動登録しました: user_id={}, receipt_id={}",
            ctx.user_id, receipt.id
        );
        Ok(UploadOutcome::AutoSubmitted { receipt })
    }

    /// 確認画面からの登録
    ///
    /// 重複候補があっても登録は妨げない
    pub async fn submit_receipt(
        &self,
        ctx: &RequestContext,
        request: SubmitReceiptRequest,
    ) -> SubmissionResult<Receipt> {
        ReceiptPaths::validate_temp_path(&ctx.user_id, &request.temp_path)
            .map_err(invalid_request)?;

        let category_id = request
            .category_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let (receipt_date, amount, category_id) = match FieldCompleteness::assess(
            request.receipt_date,
            request.amount,
            category_id,
        ) {
            FieldCompleteness::Complete {
                date,
                amount,
                category_id,
            } => (date, amount, category_id),
            FieldCompleteness::Incomplete { missing } => {
                return Err(SubmissionError::IncompleteFields { missing })
            }
        };

        validate_amount(amount).map_err(invalid_request)?;
        if !self.categories.category_exists(&category_id)? {
            return Err(SubmissionError::InvalidRequest(format!(
                "カテゴリーが存在しません: {category_id}"
            )));
        }

        let description = normalize_description(request.description);
        validate_description(&description).map_err(invalid_request)?;

        let commit_request = CommitRequest {
            user_id: ctx.user_id.clone(),
            temp_path: request.temp_path,
            receipt_date,
            amount,
            category_id,
            description,
        };

        self.commit(&commit_request).await
    }

    async fn commit(&self, request: &CommitRequest) -> SubmissionResult<Receipt> {
        let mut commit = ReceiptCommit::new(self.repository.as_ref(), self.storage.as_ref());
        commit.run(request).await
    }

    /// 領収書を編集する（Pendingのみ、本人または管理者）
    pub fn edit_receipt(
        &self,
        ctx: &RequestContext,
        receipt_id: &str,
        dto: UpdateReceiptDto,
    ) -> AppResult<Receipt> {
        let existing = self.repository.get(receipt_id)?;
        ctx.require_owner_or_admin(&existing.user_id)?;

        if !existing.status.is_editable() {
            return Err(AppError::validation(format!(
                "ステータスが{}の領収書は編集できません",
                existing.status
            )));
        }

        if dto.is_empty() {
            return Ok(existing);
        }

        if let Some(amount) = dto.amount {
            validate_amount(amount)?;
        }
        if let Some(category_id) = dto.category_id.as_deref() {
            if !self.categories.category_exists(category_id)? {
                return Err(AppError::validation(format!(
                    "カテゴリーが存在しません: {category_id}"
                )));
            }
        }
        let dto = UpdateReceiptDto {
            description: dto.description.map(|desc| desc.trim().to_string()),
            ..dto
        };
        validate_description(&dto.description)?;

        let updated = self.repository.update_fields(receipt_id, &dto)?;
        info!(
            "領収書を更新しました: receipt_id={receipt_id}, by={}",
            ctx.user_id
        );
        Ok(updated)
    }

    /// 管理者による承認・却下
    pub fn review_receipt(
        &self,
        ctx: &RequestContext,
        receipt_id: &str,
        decision: ReviewDecision,
    ) -> AppResult<Receipt> {
        self.change_status(ctx, receipt_id, decision.target_status())
    }

    /// 承認済みの領収書を個別に精算済みにする
    pub fn mark_reimbursed(&self, ctx: &RequestContext, receipt_id: &str) -> AppResult<Receipt> {
        self.change_status(ctx, receipt_id, ReceiptStatus::Reimbursed)
    }

    fn change_status(
        &self,
        ctx: &RequestContext,
        receipt_id: &str,
        next: ReceiptStatus,
    ) -> AppResult<Receipt> {
        ctx.require_admin()?;

        let existing = self.repository.get(receipt_id)?;
        if !existing.status.can_transition_to(next) {
            return Err(AppError::validation(format!(
                "ステータスが{}の領収書は{next}に変更できません",
                existing.status
            )));
        }

        let updated = self
            .repository
            .transition_status(receipt_id, existing.status, next)?;
        info!(
            "領収書のステータスを変更しました: receipt_id={receipt_id}, {} -> {next}, by={}",
            existing.status, ctx.user_id
        );
        Ok(updated)
    }

    /// 承認済みの領収書をすべて精算済みにする
    pub fn bulk_reimburse(&self, ctx: &RequestContext) -> AppResult<usize> {
        ctx.require_admin()?;

        let count = self.repository.reimburse_all_approved()?;
        info!("一括精算を実行しました: count={count}, by={}", ctx.user_id);
        Ok(count)
    }

    /// 画像パス更新に失敗した領収書を修復する（管理者のみ）
    ///
    /// 恒久パスにファイルが存在することを確認してからimage_pathを更新する
    pub async fn reconcile(
        &self,
        ctx: &RequestContext,
        receipt_id: &str,
        permanent_path: &str,
    ) -> SubmissionResult<Receipt> {
        ctx.require_admin()?;

        let receipt = self.repository.get(receipt_id)?;
        if receipt.image_path == permanent_path {
            info!("修復済みの領収書です: receipt_id={receipt_id}");
            return Ok(receipt);
        }

        let expected =
            ReceiptPaths::permanent_path(&receipt.user_id, &receipt.id, &receipt.image_path)
                .map_err(invalid_request)?;
        if expected != permanent_path {
            return Err(SubmissionError::InvalidRequest(format!(
                "恒久パスが領収書と一致しません: {permanent_path}"
            )));
        }

        if !object_exists(self.storage.as_ref(), permanent_path)
            .await
            .map_err(SubmissionError::StorageVerification)?
        {
            return Err(SubmissionError::App(AppError::not_found(format!(
                "ファイル（{permanent_path}）"
            ))));
        }

        let repaired = self
            .repository
            .update_image_path(receipt_id, permanent_path)?;
        info!(
            "領収書を修復しました: receipt_id={receipt_id}, image_path={permanent_path}, by={}",
            ctx.user_id
        );
        Ok(repaired)
    }

    /// 領収書一覧を取得する
    ///
    /// 社員は自分の領収書のみ、管理者は任意のユーザーを指定できる
    pub fn list_receipts(
        &self,
        ctx: &RequestContext,
        user_id: Option<&str>,
    ) -> AppResult<Vec<Receipt>> {
        let target = user_id.unwrap_or(ctx.user_id.as_str());
        ctx.require_owner_or_admin(target)?;
        self.repository.find_by_user(target)
    }

    /// ステータスで領収書一覧を取得する（管理者のみ）
    pub fn list_by_status(
        &self,
        ctx: &RequestContext,
        status: ReceiptStatus,
    ) -> AppResult<Vec<Receipt>> {
        ctx.require_admin()?;
        self.repository.find_by_status(status)
    }

    pub fn get_receipt(&self, ctx: &RequestContext, receipt_id: &str) -> AppResult<Receipt> {
        let receipt = self.repository.get(receipt_id)?;
        ctx.require_owner_or_admin(&receipt.user_id)?;
        Ok(receipt)
    }

    pub fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.categories.list_categories()
    }
}
