use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
#[derive(Debug, Error)]
pub enum AppError {
    /// データベース関連のエラー
    #[error("データベースエラー: {0}")]
    Database(String),

    /// バリデーション関連のエラー
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// リソースが見つからない場合のエラー
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 権限関連のエラー
    #[error("セキュリティエラー: {0}")]
    Security(String),

    /// 設定関連のエラー
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// I/O関連のエラー
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    /// 並行処理関連のエラー（接続ロックの取得失敗など）
    #[error("並行処理エラー: {0}")]
    Concurrency(String),

    /// ストレージ（R2）関連のエラー
    #[error("ストレージエラー: {0}")]
    Storage(String),
}

/// エラーの重要度を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    /// 低重要度（ユーザー入力エラーなど）
    Low,
    /// 中重要度（外部サービス一時的エラーなど）
    Medium,
    /// 高重要度（データベースエラーなど）
    High,
    /// 最重要（権限エラーなど）
    Critical,
}

impl AppError {
    /// ユーザーに表示するためのフレンドリーなメッセージを取得
    ///
    /// # 戻り値
    /// ユーザーに表示可能なエラーメッセージ
    pub fn user_message(&self) -> &str {
        match self {
            AppError::Database(_) => "データベース操作でエラーが発生しました。もう一度お試しください",
            AppError::Validation(msg) => msg,
            AppError::NotFound(msg) => msg,
            AppError::Security(_) => "この操作を行う権限がありません",
            AppError::Configuration(_) => "設定エラーが発生しました",
            AppError::Io(_) => "ファイル操作でエラーが発生しました",
            AppError::Concurrency(_) => "並行処理でエラーが発生しました",
            AppError::Storage(_) => "クラウドストレージでエラーが発生しました。もう一度お試しください",
        }
    }

    /// エラーの詳細情報を取得（ログ出力用）
    pub fn details(&self) -> String {
        format!("{self}")
    }

    /// エラーの重要度を取得
    ///
    /// # 戻り値
    /// エラーの重要度レベル
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::Database(_) => ErrorSeverity::High,
            AppError::Validation(_) => ErrorSeverity::Low,
            AppError::NotFound(_) => ErrorSeverity::Low,
            AppError::Security(_) => ErrorSeverity::Critical,
            AppError::Configuration(_) => ErrorSeverity::High,
            AppError::Io(_) => ErrorSeverity::Medium,
            AppError::Concurrency(_) => ErrorSeverity::High,
            AppError::Storage(_) => ErrorSeverity::Medium,
        }
    }

    /// バリデーションエラーを作成するヘルパー関数
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// リソース未発見エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `resource` - 見つからなかったリソース名
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        AppError::NotFound(format!("{}が見つかりません", resource.into()))
    }

    /// 権限エラーを作成するヘルパー関数
    pub fn security<S: Into<String>>(message: S) -> Self {
        AppError::Security(message.into())
    }

    /// 設定エラーを作成するヘルパー関数
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }

    /// 並行処理エラーを作成するヘルパー関数
    pub fn concurrency<S: Into<String>>(message: S) -> Self {
        AppError::Concurrency(message.into())
    }

    /// ストレージエラーを作成するヘルパー関数
    pub fn storage<S: Into<String>>(message: S) -> Self {
        AppError::Storage(message.into())
    }
}

/// AppErrorからStringへの変換（コマンド層での使用のため）
impl From<AppError> for String {
    fn from(error: AppError) -> Self {
        error.user_message().to_string()
    }
}

/// rusqlite::ErrorからAppErrorへの変換
impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        AppError::Database(error.to_string())
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;
