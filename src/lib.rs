pub mod features;
pub mod shared;

use features::categories::{CategoryLookup, SqliteCategoryRepository};
use features::receipts::{
    DisabledExtractor, HttpReceiptExtractor, MemoryStorage, R2ReceiptStorage, ReceiptExtractor,
    ReceiptService, ReceiptStorage, SqliteReceiptRepository,
};
use log::{error, info, warn};
use rusqlite::Connection;
use shared::config::{
    initialize_logging_system, load_environment_variables, log_initialization_complete,
    resolve_storage_locations, EnvironmentConfig, ExtractionConfig, R2Config,
};
use shared::database::{create_tables, initialize_database, share_connection, SharedConnection};
use shared::errors::{AppError, AppResult};
use std::sync::Arc;

/// アプリケーション状態（データベース接続とサービスを保持）
pub struct AppState {
    pub db: SharedConnection,
    pub receipt_service: ReceiptService,
}

/// アプリケーション状態の組み立て
///
/// ストレージと読み取りサービスは差し替え可能。既定はメモリ上のストレージと
/// 読み取りなし（常に手動確認）。
pub struct AppStateBuilder {
    db: SharedConnection,
    storage: Arc<dyn ReceiptStorage>,
    extractor: Arc<dyn ReceiptExtractor>,
}

impl AppStateBuilder {
    pub fn new(db: SharedConnection) -> Self {
        Self {
            db,
            storage: Arc::new(MemoryStorage::new()),
            extractor: Arc::new(DisabledExtractor),
        }
    }

    /// メモリ上のデータベースで組み立てる（テスト・動作確認用）
    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Self::new(share_connection(conn)))
    }

    pub fn with_storage(mut self, storage: Arc<dyn ReceiptStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ReceiptExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn build(self) -> AppState {
        let receipt_service = ReceiptService::new(
            Arc::new(SqliteReceiptRepository::new(self.db.clone())),
            Arc::new(SqliteCategoryRepository::new(self.db.clone())),
            self.storage,
            self.extractor,
        );

        AppState {
            db: self.db,
            receipt_service,
        }
    }
}

/// アプリケーションを初期化する
///
/// 環境変数 → ログ → データベース → R2ストレージ → 読み取りサービス の順に準備する
pub async fn initialize_application() -> AppResult<AppState> {
    load_environment_variables();
    initialize_logging_system();

    info!("アプリケーション初期化を開始します...");
    let env_config = EnvironmentConfig::from_env();

    let locations = resolve_storage_locations()?;
    let db = share_connection(initialize_database(&locations.database_path).map_err(|e| {
        error!("データベースの初期化に失敗しました: {e}");
        e
    })?);

    let storage = initialize_storage(&env_config).await?;
    let extractor = initialize_extractor(&db)?;

    log_initialization_complete(&locations);
    info!("アプリケーション初期化が完了しました");

    Ok(AppStateBuilder::new(db)
        .with_storage(storage)
        .with_extractor(extractor)
        .build())
}

/// R2ストレージを準備する
///
/// 本番環境ではR2の設定が必須。開発環境で未設定の場合はメモリ上のストレージを使う
async fn initialize_storage(env_config: &EnvironmentConfig) -> AppResult<Arc<dyn ReceiptStorage>> {
    let Some(r2_config) = R2Config::from_env() else {
        if env_config.is_production() {
            return Err(AppError::configuration("本番環境ではR2の設定が必要です"));
        }
        warn!("R2が設定されていないため、メモリ上のストレージを使用します（開発環境）");
        return Ok(Arc::new(MemoryStorage::new()));
    };

    info!("R2設定: {:?}", r2_config.get_debug_info());
    let storage = R2ReceiptStorage::new(r2_config).await?;

    if let Err(e) = storage.test_connection().await {
        warn!("R2接続テストに失敗しました。起動は続行します: {e}");
    }

    Ok(Arc::new(storage))
}

/// 読み取りサービスを準備する（未設定なら常に手動確認）
fn initialize_extractor(db: &SharedConnection) -> AppResult<Arc<dyn ReceiptExtractor>> {
    let Some(config) = ExtractionConfig::from_env() else {
        warn!("読み取りサービスが設定されていないため、すべての領収書を手動確認に回します");
        return Ok(Arc::new(DisabledExtractor));
    };

    info!("読み取りサービス設定: {:?}", config.get_debug_info());

    let category_names = SqliteCategoryRepository::new(db.clone())
        .list_categories()?
        .into_iter()
        .map(|category| category.name)
        .collect();

    let extractor = HttpReceiptExtractor::new(config, category_names)
        .map_err(|e| AppError::configuration(e.to_string()))?;

    Ok(Arc::new(extractor))
}
