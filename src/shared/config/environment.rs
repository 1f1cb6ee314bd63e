use std::collections::HashMap;
use std::time::Duration;

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: String,
    /// デバッグモードの有効/無効
    pub debug_mode: bool,
    /// ログレベル
    pub log_level: String,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Self {
        let environment = get_environment();
        let debug_mode = environment == Environment::Development;
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if debug_mode {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

        Self {
            environment: format!("{environment:?}").to_lowercase(),
            debug_mode,
            log_level,
        }
    }

    /// プロダクション環境かどうかを判定
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 開発環境かどうかを判定
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// ログレベル文字列を`log::LevelFilter`に変換する
    ///
    /// 不明な値は`Info`として扱う
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.log_level.to_lowercase().as_str() {
            "error" => log::LevelFilter::Error,
            "warn" => log::LevelFilter::Warn,
            "info" => log::LevelFilter::Info,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }
}

/// 現在の実行環境を判定する
///
/// # 判定ロジック
/// 1. 実行時環境変数 ENVIRONMENT を確認
/// 2. デバッグビルドの場合は Development
/// 3. リリースビルドの場合は Production
pub fn get_environment() -> Environment {
    if let Ok(env_var) = std::env::var("ENVIRONMENT") {
        let env = match env_var.as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    let env = if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    };
    log::debug!(
        "環境判定: ビルド設定を使用 -> debug_assertions={} -> {env:?}",
        cfg!(debug_assertions)
    );
    env
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # ファイル名の規則
/// - 開発環境: "dev_receipts.db"
/// - プロダクション環境: "receipts.db"
pub fn get_database_filename(env: Environment) -> &'static str {
    match env {
        Environment::Development => "dev_receipts.db",
        Environment::Production => "receipts.db",
    }
}

/// 環境に応じた.envファイルを読み込む
///
/// 環境固有のファイルがない場合はデフォルトの.envにフォールバックする。
/// どちらもない場合は直接設定された環境変数をそのまま使う。
pub fn load_environment_variables() {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    let env_file = match environment.as_str() {
        "production" => ".env.production",
        _ => ".env",
    };

    log::info!("環境: {environment}, 読み込み対象: {env_file}");

    match dotenv::from_filename(env_file) {
        Ok(_) => {
            log::info!("{env_file}ファイルを読み込みました");
        }
        Err(_) => {
            if env_file != ".env" {
                match dotenv::dotenv() {
                    Ok(_) => {
                        log::warn!(
                            "{env_file}が見つからないため、デフォルトの.envファイルを読み込みました"
                        );
                    }
                    Err(_) => {
                        log::warn!("環境変数ファイルが見つかりません。直接設定された環境変数を使用します。");
                    }
                }
            } else {
                log::warn!(".envファイルが見つかりません。直接設定された環境変数を使用します。");
            }
        }
    }
}

/// ログシステムを初期化する
///
/// 二回目以降の呼び出しは何もしない。
pub fn initialize_logging_system() {
    let env_config = EnvironmentConfig::from_env();

    let initialized = env_logger::Builder::from_default_env()
        .filter_level(env_config.level_filter())
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init();

    if initialized.is_ok() {
        log::info!(
            "ログシステムを初期化しました: level={}, environment={}",
            env_config.log_level,
            env_config.environment
        );
    }
}

/// 環境変数を読み込み、空文字列は未設定として扱う
fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// 秘匿値をログ用にマスクする
fn mask(value: &str) -> String {
    let head: String = value.chars().take(4).collect();
    format!("{head}****")
}

/// R2（Cloudflare R2）の設定を管理する構造体
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2のアクセスキーID
    pub access_key_id: String,
    /// R2のシークレットアクセスキー
    pub secret_access_key: String,
    /// R2のバケット名
    pub bucket_name: String,
    /// R2のエンドポイントURL
    pub endpoint_url: String,
    /// R2のリージョン
    pub region: String,
}

impl R2Config {
    /// 環境変数からR2設定を読み込む
    ///
    /// # 戻り値
    /// R2設定、または必須項目が欠けている場合はNone
    pub fn from_env() -> Option<Self> {
        log::debug!("R2Config::from_env() - 環境変数の読み込みを開始");

        let Some(access_key_id) = read_env("R2_ACCESS_KEY_ID") else {
            log::error!("R2_ACCESS_KEY_ID が見つかりません");
            return None;
        };
        log::debug!("R2_ACCESS_KEY_ID が見つかりました: {}", mask(&access_key_id));

        let Some(secret_access_key) = read_env("R2_SECRET_ACCESS_KEY") else {
            log::error!("R2_SECRET_ACCESS_KEY が見つかりません");
            return None;
        };

        let Some(bucket_name) = read_env("R2_BUCKET_NAME") else {
            log::error!("R2_BUCKET_NAME が見つかりません");
            return None;
        };

        let region = read_env("R2_REGION").unwrap_or_else(|| {
            log::debug!("R2_REGION が設定されていないため、デフォルト値 'auto' を使用");
            "auto".to_string()
        });

        // エンドポイントURLが設定されていない場合は、アカウントIDから自動構築
        let endpoint_url = read_env("R2_ENDPOINT_URL").unwrap_or_else(|| {
            if let Some(account_id) = read_env("R2_ACCOUNT_ID") {
                let url = format!("https://{account_id}.r2.cloudflarestorage.com");
                log::debug!("R2_ACCOUNT_ID からエンドポイントURLを構築: {url}");
                url
            } else {
                log::warn!("R2_ACCOUNT_ID が設定されていないため、デフォルトエンドポイントを使用");
                "https://r2.cloudflarestorage.com".to_string()
            }
        });

        log::debug!("R2Config::from_env() - 設定の読み込みが完了しました");
        Some(Self {
            access_key_id,
            secret_access_key,
            bucket_name,
            endpoint_url,
            region,
        })
    }

    /// R2設定が有効かどうかを判定
    pub fn is_valid(&self) -> bool {
        !self.access_key_id.is_empty()
            && !self.secret_access_key.is_empty()
            && !self.bucket_name.is_empty()
            && !self.endpoint_url.is_empty()
    }

    /// 設定を検証する
    pub fn validate(&self) -> Result<(), String> {
        if !self.is_valid() {
            return Err("R2設定が不完全です".to_string());
        }
        if !self.endpoint_url.starts_with("https://") {
            return Err("R2エンドポイントはHTTPS形式である必要があります".to_string());
        }
        Ok(())
    }

    /// デバッグ情報を取得（秘匿値はマスク済み）
    pub fn get_debug_info(&self) -> HashMap<String, String> {
        let mut info = HashMap::new();
        info.insert("access_key_id".to_string(), mask(&self.access_key_id));
        info.insert("bucket_name".to_string(), self.bucket_name.clone());
        info.insert("endpoint_url".to_string(), self.endpoint_url.clone());
        info.insert("region".to_string(), self.region.clone());
        info
    }
}

/// 領収書読み取り（OCR/LLM）サービスの設定
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// チャット補完互換APIのURL
    pub api_url: String,
    /// APIキー
    pub api_key: String,
    /// 使用するモデル名
    pub model: String,
    /// リクエストのタイムアウト
    pub timeout: Duration,
}

impl ExtractionConfig {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// 環境変数から読み取りサービスの設定を読み込む
    ///
    /// # 戻り値
    /// 設定、またはURL・APIキーが未設定の場合はNone
    pub fn from_env() -> Option<Self> {
        let Some(api_url) = read_env("EXTRACTION_API_URL") else {
            log::warn!("EXTRACTION_API_URL が設定されていません");
            return None;
        };
        let Some(api_key) = read_env("EXTRACTION_API_KEY") else {
            log::warn!("EXTRACTION_API_KEY が設定されていません");
            return None;
        };

        let model = read_env("EXTRACTION_MODEL").unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());
        let timeout_secs = read_env("EXTRACTION_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(Self::DEFAULT_TIMEOUT_SECS);

        Some(Self {
            api_url,
            api_key,
            model,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// 設定を検証する
    pub fn validate(&self) -> Result<(), String> {
        let url = url::Url::parse(&self.api_url)
            .map_err(|e| format!("EXTRACTION_API_URLが不正です: {e}"))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err("EXTRACTION_API_URLはHTTP(S)形式である必要があります".to_string());
        }
        if self.api_key.is_empty() {
            return Err("EXTRACTION_API_KEYが空です".to_string());
        }
        if self.timeout.is_zero() {
            return Err("EXTRACTION_TIMEOUT_SECSは1以上である必要があります".to_string());
        }
        Ok(())
    }

    /// デバッグ情報を取得（秘匿値はマスク済み）
    pub fn get_debug_info(&self) -> HashMap<String, String> {
        let mut info = HashMap::new();
        info.insert("api_url".to_string(), self.api_url.clone());
        info.insert("api_key".to_string(), mask(&self.api_key));
        info.insert("model".to_string(), self.model.clone());
        info.insert("timeout_secs".to_string(), self.timeout.as_secs().to_string());
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r2_config() -> R2Config {
        R2Config {
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            bucket_name: "receipts".to_string(),
            endpoint_url: "https://account.r2.cloudflarestorage.com".to_string(),
            region: "auto".to_string(),
        }
    }

    #[test]
    fn test_get_database_filename() {
        assert_eq!(
            get_database_filename(Environment::Development),
            "dev_receipts.db"
        );
        assert_eq!(get_database_filename(Environment::Production), "receipts.db");
    }

    #[test]
    fn test_environment_config_methods() {
        let dev_config = EnvironmentConfig {
            environment: "development".to_string(),
            debug_mode: true,
            log_level: "debug".to_string(),
        };
        let prod_config = EnvironmentConfig {
            environment: "production".to_string(),
            debug_mode: false,
            log_level: "verbose".to_string(),
        };

        assert!(dev_config.is_development());
        assert!(!dev_config.is_production());
        assert_eq!(dev_config.level_filter(), log::LevelFilter::Debug);

        assert!(prod_config.is_production());
        // 不明なレベルはInfoにフォールバック
        assert_eq!(prod_config.level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_r2_config_validation() {
        assert!(r2_config().validate().is_ok());

        let mut missing_bucket = r2_config();
        missing_bucket.bucket_name = String::new();
        assert!(missing_bucket.validate().is_err());

        let mut plain_http = r2_config();
        plain_http.endpoint_url = "http://localhost:9000".to_string();
        assert!(plain_http.validate().is_err());
    }

    #[test]
    fn test_r2_debug_info_masks_secrets() {
        let info = r2_config().get_debug_info();
        assert_eq!(info.get("access_key_id"), Some(&"AKIA****".to_string()));
        assert!(!info.values().any(|v| v.contains("secret")));
    }

    #[test]
    fn test_extraction_config_validation() {
        let config = ExtractionConfig {
            api_url: "https://api.example.com/v1/chat/completions".to_string(),
            api_key: "sk-test-key".to_string(),
            model: ExtractionConfig::DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.get_debug_info().get("api_key"), Some(&"sk-t****".to_string()));

        let invalid = ExtractionConfig {
            api_url: "not a url".to_string(),
            ..config.clone()
        };
        assert!(invalid.validate().is_err());

        let zero_timeout = ExtractionConfig {
            timeout: Duration::ZERO,
            ..config
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_load_environment_variables() {
        // 環境変数ファイルがなくてもパニックしない
        load_environment_variables();
    }
}
