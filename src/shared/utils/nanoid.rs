use nanoid::nanoid;

/// レコードID用のnanoIdの長さ
pub const RECORD_ID_LENGTH: usize = 21;

/// 領収書レコード用のnanoIdを生成する
///
/// # 戻り値
/// 21文字のURL-safeなnanoId
///
/// # 特性
/// - 文字セット: A-Za-z0-9_- (64文字)
/// - ストレージのキー（`{user_id}/{receipt_id}.{ext}`）にそのまま使える
pub fn generate_record_id() -> String {
    nanoid!()
}

/// nanoIdが有効な形式かどうかを検証する
///
/// # 検証条件
/// - 長さが21文字
/// - URL-safe文字（A-Za-z0-9_-）のみを含む
pub fn is_valid_nanoid(id: &str) -> bool {
    id.len() == RECORD_ID_LENGTH
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_record_id() {
        let id1 = generate_record_id();
        let id2 = generate_record_id();

        assert_eq!(id1.len(), RECORD_ID_LENGTH);
        assert_ne!(id1, id2);
        assert!(is_valid_nanoid(&id1));
    }

    #[test]
    fn test_is_valid_nanoid() {
        assert!(is_valid_nanoid("123456789012345678901"));

        assert!(!is_valid_nanoid("short"));
        assert!(!is_valid_nanoid("this_is_way_too_long_to_be_a_valid_nanoid"));
        assert!(!is_valid_nanoid("123456789012345678@01"));
        assert!(!is_valid_nanoid("has space in it 12345"));
        // 全角文字は不可
        assert!(!is_valid_nanoid("１２３４５６７８９０１２３４５６７８９０１"));
    }
}
