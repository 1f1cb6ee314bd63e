// テスト用の差し替え実装（障害注入）

use super::errors::StorageError;
use super::extraction::{ExtractionError, ReceiptExtractor};
use super::models::{
    DuplicateCandidate, ExtractedFields, NewReceipt, Receipt, ReceiptStatus, UpdateReceiptDto,
};
use super::repository::{ReceiptRepository, SqliteReceiptRepository};
use super::storage::{MemoryStorage, ReceiptStorage, StorageEntry};
use crate::features::categories::SqliteCategoryRepository;
use crate::shared::database::{create_tables, share_connection, SharedConnection};
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn test_connection() -> SharedConnection {
    let conn = Connection::open_in_memory().unwrap();
    create_tables(&conn).unwrap();
    share_connection(conn)
}

pub fn category_repository(conn: &SharedConnection) -> SqliteCategoryRepository {
    SqliteCategoryRepository::new(conn.clone())
}

/// 指定した操作を失敗させられるリポジトリ
pub struct FlakyRepository {
    inner: SqliteReceiptRepository,
    pub fail_insert: AtomicBool,
    pub fail_update_image_path: AtomicBool,
    pub fail_delete: AtomicBool,
    duplicate_queries: AtomicUsize,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::with_connection(test_connection())
    }

    pub fn with_connection(conn: SharedConnection) -> Self {
        Self {
            inner: SqliteReceiptRepository::new(conn),
            fail_insert: AtomicBool::new(false),
            fail_update_image_path: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            duplicate_queries: AtomicUsize::new(0),
        }
    }

    pub fn duplicate_queries(&self) -> usize {
        self.duplicate_queries.load(Ordering::SeqCst)
    }

    /// 全ユーザー分の件数
    pub fn count(&self) -> usize {
        [
            ReceiptStatus::Pending,
            ReceiptStatus::Approved,
            ReceiptStatus::Rejected,
            ReceiptStatus::Reimbursed,
        ]
        .into_iter()
        .map(|status| self.inner.find_by_status(status).unwrap().len())
        .sum()
    }

    fn injected(flag: &AtomicBool, operation: &str) -> AppResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(AppError::Database(format!("injected failure: {operation}")))
        } else {
            Ok(())
        }
    }
}

impl ReceiptRepository for FlakyRepository {
    fn insert(&self, receipt: &NewReceipt) -> AppResult<Receipt> {
        Self::injected(&self.fail_insert, "insert")?;
        self.inner.insert(receipt)
    }

    fn get(&self, id: &str) -> AppResult<Receipt> {
        self.inner.get(id)
    }

    fn update_image_path(&self, id: &str, image_path: &str) -> AppResult<Receipt> {
        Self::injected(&self.fail_update_image_path, "update_image_path")?;
        self.inner.update_image_path(id, image_path)
    }

    fn update_fields(&self, id: &str, dto: &UpdateReceiptDto) -> AppResult<Receipt> {
        self.inner.update_fields(id, dto)
    }

    fn transition_status(
        &self,
        id: &str,
        from: ReceiptStatus,
        to: ReceiptStatus,
    ) -> AppResult<Receipt> {
        self.inner.transition_status(id, from, to)
    }

    fn delete(&self, id: &str) -> AppResult<()> {
        Self::injected(&self.fail_delete, "delete")?;
        self.inner.delete(id)
    }

    fn find_duplicates(
        &self,
        user_id: &str,
        date: NaiveDate,
        amount: Decimal,
    ) -> AppResult<Vec<DuplicateCandidate>> {
        self.duplicate_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.find_duplicates(user_id, date, amount)
    }

    fn find_by_user(&self, user_id: &str) -> AppResult<Vec<Receipt>> {
        self.inner.find_by_user(user_id)
    }

    fn find_by_status(&self, status: ReceiptStatus) -> AppResult<Vec<Receipt>> {
        self.inner.find_by_status(status)
    }

    fn reimburse_all_approved(&self) -> AppResult<usize> {
        self.inner.reimburse_all_approved()
    }
}

/// 指定した操作を失敗させられるストレージ
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_upload: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_move: AtomicBool,
    pub fail_remove: AtomicBool,
    removed: Mutex<Vec<String>>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// removeが呼ばれたパス（失敗したものも含む）
    pub fn removed_paths(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    fn injected(flag: &AtomicBool, operation: &str) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Transient(format!("injected failure: {operation}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReceiptStorage for FlakyStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        Self::injected(&self.fail_upload, "upload")?;
        self.inner.upload(path, bytes, content_type).await
    }

    async fn list(
        &self,
        folder: &str,
        name_filter: &str,
    ) -> Result<Vec<StorageEntry>, StorageError> {
        Self::injected(&self.fail_list, "list")?;
        self.inner.list(folder, name_filter).await
    }

    async fn move_object(&self, src_path: &str, dst_path: &str) -> Result<(), StorageError> {
        Self::injected(&self.fail_move, "move")?;
        self.inner.move_object(src_path, dst_path).await
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.removed.lock().unwrap().push(path.to_string());
        Self::injected(&self.fail_remove, "remove")?;
        self.inner.remove(path).await
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.download(path).await
    }
}

/// 固定の結果を返す読み取りサービス
pub struct FixedExtractor {
    result: Option<ExtractedFields>,
    calls: AtomicUsize,
}

impl FixedExtractor {
    pub fn returning(fields: ExtractedFields) -> Self {
        Self {
            result: Some(fields),
            calls: AtomicUsize::new(0),
        }
    }

    /// 常に通信エラーを返す
    pub fn failing() -> Self {
        Self {
            result: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReceiptExtractor for FixedExtractor {
    async fn extract(
        &self,
        _image: &[u8],
        _media_type: &str,
    ) -> Result<ExtractedFields, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .ok_or_else(|| ExtractionError::Request("connection refused".to_string()))
    }
}
