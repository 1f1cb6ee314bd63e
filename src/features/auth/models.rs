use crate::shared::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// ユーザーの権限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// 一般社員
    Employee,
    /// 管理者
    Admin,
}

/// リクエスト単位の認証コンテキスト
///
/// セッションの検証はリクエストごとに一度だけ行い、その結果をこの値として
/// 各操作に明示的に渡す。グローバルなセッション状態は持たない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// 認証済みユーザーID
    pub user_id: String,
    /// 権限
    pub role: UserRole,
}

impl RequestContext {
    /// 一般社員のコンテキストを作成
    pub fn employee<S: Into<String>>(user_id: S) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Employee,
        }
    }

    /// 管理者のコンテキストを作成
    pub fn admin<S: Into<String>>(user_id: S) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// 管理者であることを要求する
    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            log::warn!("管理者権限のない操作を拒否しました: user_id={}", self.user_id);
            Err(AppError::security("管理者権限が必要です"))
        }
    }

    /// 所有者本人または管理者であることを要求する
    pub fn require_owner_or_admin(&self, owner_id: &str) -> AppResult<()> {
        if self.is_admin() || self.user_id == owner_id {
            Ok(())
        } else {
            log::warn!(
                "他ユーザーのリソースへのアクセスを拒否しました: user_id={}, owner_id={owner_id}",
                self.user_id
            );
            Err(AppError::security("アクセス権限がありません"))
        }
    }
}
