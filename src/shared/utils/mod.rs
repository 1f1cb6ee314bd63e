/// レコードID生成
pub mod nanoid;

use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use chrono_tz::Asia::Tokyo;
use rust_decimal::Decimal;
use std::path::Path;

pub use self::nanoid::{generate_record_id, is_valid_nanoid};

/// アップロード可能なファイルサイズの上限（10MB）
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// 説明文の最大文字数
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// 金額の小数点以下の最大桁数
pub const MAX_AMOUNT_SCALE: u32 = 2;

/// 金額のバリデーション
///
/// # バリデーション規則
/// - 0以上であること
/// - 小数点以下は2桁まで（末尾の0は無視）
pub fn validate_amount(amount: Decimal) -> AppResult<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AppError::validation("金額は0以上で入力してください"));
    }

    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(AppError::validation(
            "金額は小数点以下2桁まで入力してください",
        ));
    }

    Ok(())
}

/// 文字列の長さバリデーション
///
/// # 引数
/// * `text` - 検証対象の文字列
/// * `max_length` - 最大文字数
/// * `field_name` - フィールド名（エラーメッセージ用）
pub fn validate_text_length(text: &str, max_length: usize, field_name: &str) -> AppResult<()> {
    let char_count = text.chars().count();
    if char_count > max_length {
        return Err(AppError::validation(format!(
            "{field_name}は{max_length}文字以内で入力してください（現在: {char_count}文字）"
        )));
    }
    Ok(())
}

/// 説明文のバリデーション（Noneは有効）
pub fn validate_description(description: &Option<String>) -> AppResult<()> {
    if let Some(desc) = description {
        validate_text_length(desc, MAX_DESCRIPTION_LENGTH, "説明")?;
    }
    Ok(())
}

/// 説明文を正規化する（前後の空白を削除し、空ならNone）
pub fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|desc| desc.trim().to_string())
        .filter(|desc| !desc.is_empty())
}

/// 現在の日時をJST（日本標準時）で取得
///
/// # 戻り値
/// JST形式のRFC3339文字列
pub fn get_current_jst_timestamp() -> String {
    Utc::now().with_timezone(&Tokyo).to_rfc3339()
}

/// ファイル名から小文字の拡張子を取得する
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .filter(|s| !s.is_empty())
}

/// ファイル形式を検証する（PNG、JPG、JPEG、PDFのみ）
pub fn validate_file_format(filename: &str) -> AppResult<String> {
    let extension = file_extension(filename)
        .ok_or_else(|| AppError::validation("ファイル拡張子が取得できません"))?;

    if !matches!(extension.as_str(), "png" | "jpg" | "jpeg" | "pdf") {
        return Err(AppError::validation(
            "サポートされていないファイル形式です（PNG、JPG、JPEG、PDFのみ対応）",
        ));
    }

    Ok(extension)
}

/// ファイルサイズを検証する
pub fn validate_file_size(file_size: u64) -> AppResult<()> {
    if file_size == 0 {
        return Err(AppError::validation("ファイルが空です"));
    }

    if file_size > MAX_FILE_SIZE {
        return Err(AppError::validation(
            "ファイルサイズが10MBを超えています",
        ));
    }

    Ok(())
}

/// Content-Typeを推定する
pub fn get_content_type(filename: &str) -> &'static str {
    match file_extension(filename).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
