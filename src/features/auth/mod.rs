/// 認証済みリクエストのコンテキスト
pub mod models;

pub use models::{RequestContext, UserRole};
