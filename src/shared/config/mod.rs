//! 設定管理
//!
//! 環境判定、環境変数の読み込み、ログ初期化、外部サービス設定を提供します。

pub mod environment;
pub mod initialization;

pub use environment::{
    get_database_filename, get_environment, initialize_logging_system, load_environment_variables,
    Environment, EnvironmentConfig, ExtractionConfig, R2Config,
};
pub use initialization::{
    log_initialization_complete, resolve_storage_locations, InitializationResult,
};
