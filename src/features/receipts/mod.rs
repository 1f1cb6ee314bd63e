/// 領収書機能モジュール
///
/// アップロードされた領収書の読み取り、重複チェック、自動登録の判定、
/// 一時パスから恒久パスへの二段階コミット、審査・精算を提供します。
pub mod commands;
pub mod commit;
pub mod decision;
pub mod duplicates;
pub mod errors;
pub mod extraction;
pub mod models;
pub mod paths;
pub mod r2_storage;
pub mod repository;
pub mod service;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use commit::{CommitRequest, CommitState, Compensation, ReceiptCommit};
pub use decision::{decide, DecisionReason, FieldCompleteness, SubmissionDecision};
pub use errors::{StorageError, SubmissionError, SubmissionResult};
pub use extraction::{DisabledExtractor, ExtractionError, HttpReceiptExtractor, ReceiptExtractor};
pub use models::*;
pub use paths::ReceiptPaths;
pub use r2_storage::R2ReceiptStorage;
pub use repository::{ReceiptRepository, SqliteReceiptRepository};
pub use service::ReceiptService;
pub use storage::{MemoryStorage, ReceiptStorage, StorageEntry};
