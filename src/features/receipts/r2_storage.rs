// Cloudflare R2（S3互換）ストレージ

use super::errors::StorageError;
use super::storage::{ReceiptStorage, StorageEntry};
use crate::shared::config::R2Config;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, Config};
use log::{debug, error, info, warn};

/// R2上の領収書ストレージ
pub struct R2ReceiptStorage {
    client: Client,
    bucket_name: String,
}

impl R2ReceiptStorage {
    /// R2クライアントを初期化
    pub async fn new(config: R2Config) -> AppResult<Self> {
        info!("R2クライアントを初期化しています...");

        config.validate().map_err(|e| {
            error!("R2設定の検証に失敗しました: {e}");
            AppError::configuration(e)
        })?;

        // 認証情報はログに出力しない
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        debug!("AWS設定を構築中... エンドポイント: {}", config.endpoint_url);
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .load()
            .await;

        let client = Client::from_conf(Config::from(&aws_config));

        info!(
            "R2クライアントの初期化が完了しました。バケット: {}",
            config.bucket_name
        );

        Ok(Self {
            client,
            bucket_name: config.bucket_name,
        })
    }

    /// 接続テスト（バケットの存在確認）
    pub async fn test_connection(&self) -> Result<(), StorageError> {
        info!("R2接続テストを開始します: bucket={}", self.bucket_name);

        self.client
            .head_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .map_err(|e| classify_sdk_error("接続テスト", &self.bucket_name, e))?;

        info!("R2接続テスト成功: bucket={}", self.bucket_name);
        Ok(())
    }

    async fn copy(&self, src_path: &str, dst_path: &str) -> Result<(), StorageError> {
        let copy_source = format!("{}/{}", self.bucket_name, urlencoding::encode(src_path));

        self.client
            .copy_object()
            .bucket(&self.bucket_name)
            .copy_source(copy_source)
            .key(dst_path)
            .send()
            .await
            .map_err(|e| classify_sdk_error("コピー", src_path, e))?;

        Ok(())
    }
}

/// SDKのエラーをストレージエラーに分類する
fn classify_sdk_error<E>(operation: &str, key: &str, error: SdkError<E, HttpResponse>) -> StorageError
where
    E: std::error::Error + 'static,
{
    let message = format!("{operation}: key={key}, error={}", DisplayErrorContext(&error));

    let classified = match &error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            StorageError::Transient(message)
        }
        SdkError::ConstructionFailure(_) => StorageError::Other(message),
        _ => classify_status(error.raw_response().map(|r| r.status().as_u16()), message),
    };

    warn!("R2操作に失敗しました: {classified}");
    classified
}

/// HTTPステータスコードからエラー種別を判定する
fn classify_status(status: Option<u16>, message: String) -> StorageError {
    match status {
        Some(404) => StorageError::NotFound(message),
        Some(401) | Some(403) => StorageError::PermissionDenied(message),
        Some(408) | Some(429) | Some(500..=599) => StorageError::Transient(message),
        _ => StorageError::Other(message),
    }
}

#[async_trait]
impl ReceiptStorage for R2ReceiptStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let file_size = bytes.len();
        info!("ファイルアップロード開始: key={path}, size={file_size} bytes, content_type={content_type}");

        let start_time = std::time::Instant::now();

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(path)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| classify_sdk_error("アップロード", path, e))?;

        info!(
            "ファイルアップロード成功: key={path}, duration={:?}",
            start_time.elapsed()
        );
        Ok(())
    }

    async fn list(
        &self,
        folder: &str,
        name_filter: &str,
    ) -> Result<Vec<StorageEntry>, StorageError> {
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{folder}/")
        };

        let mut entries = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(&prefix)
                .delimiter("/")
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| classify_sdk_error("一覧取得", folder, e))?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                let name = key.strip_prefix(&prefix).unwrap_or(key);
                if name.contains(name_filter) {
                    entries.push(StorageEntry {
                        name: name.to_string(),
                        size: object.size().unwrap_or(0).max(0) as u64,
                    });
                }
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(
            "一覧取得: folder={folder}, filter={name_filter}, count={}",
            entries.len()
        );
        Ok(entries)
    }

    /// コピー後に移動元を削除する
    ///
    /// 移動元の削除に失敗した場合はコピー先を削除し、移動しなかった状態に戻す
    async fn move_object(&self, src_path: &str, dst_path: &str) -> Result<(), StorageError> {
        info!("ファイル移動開始: {src_path} -> {dst_path}");

        self.copy(src_path, dst_path).await?;

        if let Err(delete_error) = self.remove(src_path).await {
            warn!("移動元の削除に失敗したため、コピー先を削除します: key={dst_path}");
            if let Err(cleanup_error) = self.remove(dst_path).await {
                error!(
                    "コピー先の削除に失敗しました: key={dst_path}, error={cleanup_error}"
                );
            }
            return Err(delete_error);
        }

        info!("ファイル移動成功: {src_path} -> {dst_path}");
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(path)
            .send()
            .await
            .map_err(|e| classify_sdk_error("削除", path, e))?;

        debug!("ファイルを削除しました: key={path}");
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(path)
            .send()
            .await
            .map_err(|e| classify_sdk_error("ダウンロード", path, e))?;

        let data = output.body.collect().await.map_err(|e| {
            StorageError::Transient(format!("ダウンロードデータの読み込みエラー: key={path}, error={e}"))
        })?;

        Ok(data.into_bytes().to_vec())
    }
}
