// 領収書ファイルのストレージ抽象化

use super::errors::StorageError;
use super::paths::ReceiptPaths;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// 一覧取得の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// フォルダ内のファイル名
    pub name: String,
    pub size: u64,
}

/// ユーザーごとに`{user_id}/...`で区切られたオブジェクトストレージ
#[async_trait]
pub trait ReceiptStorage: Send + Sync {
    /// オブジェクトを保存する（同じパスは上書き）
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;

    /// フォルダ直下でファイル名に`name_filter`を含むオブジェクトを列挙する
    async fn list(&self, folder: &str, name_filter: &str)
        -> Result<Vec<StorageEntry>, StorageError>;

    /// オブジェクトを移動する
    ///
    /// 移動元が存在しない場合は`StorageError::NotFound`
    async fn move_object(&self, src_path: &str, dst_path: &str) -> Result<(), StorageError>;

    async fn remove(&self, path: &str) -> Result<(), StorageError>;

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError>;
}

/// 格納フォルダを再列挙し、ファイル名が完全一致するオブジェクトがあるか確認する
pub async fn object_exists(storage: &dyn ReceiptStorage, path: &str) -> Result<bool, StorageError> {
    let (folder, name) = ReceiptPaths::split(path);
    let entries = storage.list(folder, name).await?;
    Ok(entries.iter().any(|entry| entry.name == name))
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// メモリ上のストレージ（テスト・ローカル開発用）
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>>, StorageError> {
        self.objects
            .lock()
            .map_err(|e| StorageError::Other(format!("ストレージのロック取得エラー: {e}")))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock()
            .map(|objects| objects.contains_key(path))
            .unwrap_or(false)
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .ok()
            .and_then(|objects| objects.get(path).map(|o| o.bytes.clone()))
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.lock()
            .ok()
            .and_then(|objects| objects.get(path).map(|o| o.content_type.clone()))
    }

    /// 保存されている全パス
    pub fn paths(&self) -> Vec<String> {
        self.lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReceiptStorage for MemoryStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.lock()?.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn list(
        &self,
        folder: &str,
        name_filter: &str,
    ) -> Result<Vec<StorageEntry>, StorageError> {
        let objects = self.lock()?;
        let entries = objects
            .iter()
            .filter_map(|(path, object)| {
                let (object_folder, name) = ReceiptPaths::split(path);
                (object_folder == folder && name.contains(name_filter)).then(|| StorageEntry {
                    name: name.to_string(),
                    size: object.bytes.len() as u64,
                })
            })
            .collect();
        Ok(entries)
    }

    async fn move_object(&self, src_path: &str, dst_path: &str) -> Result<(), StorageError> {
        let mut objects = self.lock()?;
        let object = objects
            .remove(src_path)
            .ok_or_else(|| StorageError::NotFound(src_path.to_string()))?;
        objects.insert(dst_path.to_string(), object);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.lock()?
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.lock()?
            .get(path)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}
