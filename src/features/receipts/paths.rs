// 領収書ファイルのストレージパス管理
//
// 一時パス:   {user_id}/temp/{uuid}.{ext}
// 恒久パス:   {user_id}/{receipt_id}.{ext}

use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::file_extension;
use once_cell::sync::Lazy;
use regex::Regex;

const TEMP_FOLDER: &str = "temp";

static TEMP_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<user>[^/]+)/temp/(?P<name>[^/]+)\.(?P<ext>[A-Za-z0-9]+)$")
        .unwrap_or_else(|e| panic!("一時パスの正規表現が不正です: {e}"))
});

/// ストレージパスを扱うユーティリティ
pub struct ReceiptPaths;

impl ReceiptPaths {
    /// 一時アップロード用のパスを生成する（ランダムなファイル名）
    pub fn temp_path(user_id: &str, extension: &str) -> String {
        let name = uuid::Uuid::new_v4();
        format!(
            "{user_id}/{TEMP_FOLDER}/{name}.{}",
            extension.to_lowercase()
        )
    }

    /// 恒久パスを導出する
    ///
    /// レコードIDが確定した後にしか導出できない
    ///
    /// # 例
    /// ```
    /// use keihi_receipts::features::receipts::ReceiptPaths;
    ///
    /// let path = ReceiptPaths::permanent_path("user-1", "V1StGXR8_Z5jdHi6B-myT", "u/temp/a.PNG").unwrap();
    /// assert_eq!(path, "user-1/V1StGXR8_Z5jdHi6B-myT.png");
    /// ```
    pub fn permanent_path(user_id: &str, receipt_id: &str, temp_path: &str) -> AppResult<String> {
        let extension = file_extension(temp_path).ok_or_else(|| {
            AppError::validation(format!("一時パスに拡張子がありません: {temp_path}"))
        })?;
        Ok(format!("{user_id}/{receipt_id}.{extension}"))
    }

    /// パスを格納フォルダとファイル名に分割する
    pub fn split(path: &str) -> (&str, &str) {
        match path.rsplit_once('/') {
            Some((folder, name)) => (folder, name),
            None => ("", path),
        }
    }

    /// 一時パスの形式かどうか
    pub fn is_temp_path(path: &str) -> bool {
        TEMP_PATH_PATTERN.is_match(path)
    }

    /// 一時パスの所有者を取得する
    pub fn temp_path_owner(path: &str) -> Option<&str> {
        TEMP_PATH_PATTERN
            .captures(path)
            .and_then(|captures| captures.name("user"))
            .map(|m| m.as_str())
    }

    /// ユーザーが一時パスを使用できるか検証する
    pub fn validate_temp_path(user_id: &str, temp_path: &str) -> AppResult<()> {
        if temp_path.trim().is_empty() {
            return Err(AppError::validation("一時パスが指定されていません"));
        }

        match Self::temp_path_owner(temp_path) {
            Some(owner) if owner == user_id => Ok(()),
            Some(_) => Err(AppError::security("アクセス権限がありません")),
            None => Err(AppError::validation(format!(
                "一時パスの形式が不正です: {temp_path}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_format() {
        let path = ReceiptPaths::temp_path("user-1", "PNG");

        assert!(path.starts_with("user-1/temp/"));
        assert!(path.ends_with(".png"));
        assert!(ReceiptPaths::is_temp_path(&path));
        assert_eq!(ReceiptPaths::temp_path_owner(&path), Some("user-1"));
    }

    #[test]
    fn test_temp_paths_are_unique() {
        let a = ReceiptPaths::temp_path("user-1", "pdf");
        let b = ReceiptPaths::temp_path("user-1", "pdf");
        assert_ne!(a, b);
    }

    #[test]
    fn test_permanent_path_keeps_extension() {
        assert_eq!(
            ReceiptPaths::permanent_path("user-1", "abc", "user-1/temp/x.pdf").unwrap(),
            "user-1/abc.pdf"
        );
        assert_eq!(
            ReceiptPaths::permanent_path("user-1", "abc", "user-1/temp/x.JPEG").unwrap(),
            "user-1/abc.jpeg"
        );
        assert!(ReceiptPaths::permanent_path("user-1", "abc", "user-1/temp/x").is_err());
    }

    #[test]
    fn test_split() {
        assert_eq!(
            ReceiptPaths::split("user-1/temp/x.png"),
            ("user-1/temp", "x.png")
        );
        assert_eq!(ReceiptPaths::split("x.png"), ("", "x.png"));
    }

    #[test]
    fn test_validate_temp_path() {
        assert!(ReceiptPaths::validate_temp_path("user-1", "user-1/temp/x.png").is_ok());

        assert!(matches!(
            ReceiptPaths::validate_temp_path("user-1", "user-2/temp/x.png"),
            Err(AppError::Security(_))
        ));
        assert!(matches!(
            ReceiptPaths::validate_temp_path("user-1", ""),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ReceiptPaths::validate_temp_path("user-1", "user-1/abc.png"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ReceiptPaths::validate_temp_path("user-1", "user-1/temp/../x.png"),
            Err(AppError::Validation(_))
        ));
    }
}
