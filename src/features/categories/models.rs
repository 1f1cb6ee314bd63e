use serde::{Deserialize, Serialize};

/// カテゴリーデータモデル
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub display_order: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Category {
    /// 名前が大文字小文字を区別せずに一致するか
    ///
    /// 前後の空白は無視する
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn travel() -> Category {
        Category {
            id: "travel".to_string(),
            name: "Travel".to_string(),
            display_order: 1,
            is_active: true,
            created_at: "2024-01-01T00:00:00+09:00".to_string(),
            updated_at: "2024-01-01T00:00:00+09:00".to_string(),
        }
    }

    #[test]
    fn test_matches_name() {
        let category = travel();
        assert!(category.matches_name("Travel"));
        assert!(category.matches_name("TRAVEL"));
        assert!(category.matches_name(" travel "));

        // 部分一致は不可
        assert!(!category.matches_name("Travel expenses"));
        assert!(!category.matches_name("Trav"));
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&travel()).unwrap();
        assert!(json.contains("\"name\":\"Travel\""));
        assert!(json.contains("\"is_active\":true"));

        let deserialized: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, travel());
    }
}
