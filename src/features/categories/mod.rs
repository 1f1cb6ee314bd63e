/// カテゴリー機能モジュール
///
/// 固定のカテゴリー一覧と、読み取り結果のカテゴリー名からIDへの解決を提供します。
pub mod models;
pub mod repository;

pub use models::Category;
pub use repository::{CategoryLookup, SqliteCategoryRepository};
