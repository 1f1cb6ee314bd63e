/// 認証済みリクエストのコンテキスト
pub mod auth;

/// カテゴリー参照
pub mod categories;

/// 領収書の登録ワークフロー
pub mod receipts;
