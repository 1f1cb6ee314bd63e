use crate::shared::config::{get_database_filename, get_environment, Environment};
use crate::shared::errors::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};

/// アプリケーションディレクトリ名
const APP_DIR_NAME: &str = "keihi-receipts";

/// アプリケーション初期化の結果を表す構造体
#[derive(Debug)]
pub struct InitializationResult {
    /// 初回起動かどうか
    pub is_first_run: bool,
    /// アプリケーションデータディレクトリのパス
    pub app_data_dir: PathBuf,
    /// データベースファイルのパス
    pub database_path: PathBuf,
    /// 実行環境
    pub environment: Environment,
}

/// データベースの配置場所を決定する
///
/// # 処理内容
/// 1. `DATABASE_PATH` が設定されていればそれを使用
/// 2. なければプラットフォームのデータディレクトリ配下に作成
/// 3. 初回起動の判定（データベースファイルの存在で判定）
pub fn resolve_storage_locations() -> AppResult<InitializationResult> {
    let environment = get_environment();

    let database_path = match std::env::var("DATABASE_PATH") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => {
            let base = dirs::data_dir().ok_or_else(|| {
                AppError::configuration("データディレクトリを特定できません")
            })?;
            base.join(APP_DIR_NAME)
                .join(get_database_filename(environment.clone()))
        }
    };

    let app_data_dir = database_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    ensure_directory(&app_data_dir)?;

    let is_first_run = !database_path.exists();
    if is_first_run {
        log_first_run_initialization(&environment, &app_data_dir, &database_path);
    }

    Ok(InitializationResult {
        is_first_run,
        app_data_dir,
        database_path,
        environment,
    })
}

/// ディレクトリを確実に作成する
fn ensure_directory(dir: &Path) -> AppResult<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir).map_err(|e| {
        log::error!("アプリデータディレクトリの作成に失敗しました: {dir:?}, error={e}");
        AppError::Io(e)
    })?;
    log::info!("アプリケーションデータディレクトリを作成しました: {dir:?}");
    Ok(())
}

fn log_first_run_initialization(environment: &Environment, app_data_dir: &Path, database_path: &Path) {
    log::info!("=== アプリケーション初回起動 ===");
    log::info!("実行環境: {environment:?}");
    log::info!("アプリデータディレクトリ: {app_data_dir:?}");
    log::info!("データベースファイル: {database_path:?}");
}

/// 初期化完了ログを出力する
pub fn log_initialization_complete(result: &InitializationResult) {
    if result.is_first_run {
        log::info!("=== 初期化完了 ===");
        log::info!("初回起動の初期化が正常に完了しました");
    } else {
        log::info!("アプリケーション起動完了（既存データベースを使用）");
    }
    log::info!("環境: {:?}", result.environment);
    log::info!("データベース: {:?}", result.database_path);
}
