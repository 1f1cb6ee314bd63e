use crate::features::categories::models::Category;
use crate::shared::database::{lock_connection, SharedConnection};
use crate::shared::errors::{AppError, AppResult};
use rusqlite::{params, Connection, Row};

/// カテゴリーの参照インターフェース
///
/// カテゴリーは設定側で管理され、領収書のワークフローからは変更しない
pub trait CategoryLookup: Send + Sync {
    /// カテゴリー名をIDに解決する（大文字小文字を区別しない完全一致）
    ///
    /// # 戻り値
    /// 一致したカテゴリーID、一致しない場合はNone
    fn resolve_category(&self, name: &str) -> AppResult<Option<String>>;

    /// 有効なカテゴリーIDかどうか
    fn category_exists(&self, id: &str) -> AppResult<bool>;

    /// 有効なカテゴリー一覧を取得
    fn list_categories(&self) -> AppResult<Vec<Category>>;
}

fn map_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        display_order: row.get(2)?,
        is_active: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// 有効なカテゴリー一覧を表示順で取得する
pub fn find_all_active(conn: &Connection) -> AppResult<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, display_order, is_active, created_at, updated_at
         FROM categories WHERE is_active = 1 ORDER BY display_order, name",
    )?;

    let categories = stmt.query_map([], map_category)?;

    categories
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::from)
}

/// IDでカテゴリーを取得する
pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Category> {
    conn.query_row(
        "SELECT id, name, display_order, is_active, created_at, updated_at
         FROM categories WHERE id = ?1",
        params![id],
        map_category,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::not_found("カテゴリー"),
        _ => AppError::from(e),
    })
}

/// カテゴリー名をIDに解決する
///
/// SQLiteの`lower()`はASCIIのみ対応のため、比較はRust側で行う
pub fn resolve_by_name(conn: &Connection, name: &str) -> AppResult<Option<String>> {
    if name.trim().is_empty() {
        return Ok(None);
    }

    let resolved = find_all_active(conn)?
        .into_iter()
        .find(|category| category.matches_name(name))
        .map(|category| category.id);

    Ok(resolved)
}

/// SQLiteを使ったカテゴリー参照
#[derive(Clone)]
pub struct SqliteCategoryRepository {
    conn: SharedConnection,
}

impl SqliteCategoryRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

impl CategoryLookup for SqliteCategoryRepository {
    fn resolve_category(&self, name: &str) -> AppResult<Option<String>> {
        let conn = lock_connection(&self.conn)?;
        let resolved = resolve_by_name(&conn, name)?;

        match &resolved {
            Some(id) => log::debug!("カテゴリー名を解決しました: name={name}, id={id}"),
            None => log::debug!("一致するカテゴリーがありません: name={name}"),
        }

        Ok(resolved)
    }

    fn category_exists(&self, id: &str) -> AppResult<bool> {
        let conn = lock_connection(&self.conn)?;
        match find_by_id(&conn, id) {
            Ok(category) => Ok(category.is_active),
            Err(AppError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn list_categories(&self) -> AppResult<Vec<Category>> {
        let conn = lock_connection(&self.conn)?;
        find_all_active(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::database::{create_tables, share_connection};

    fn create_test_repository() -> SqliteCategoryRepository {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        SqliteCategoryRepository::new(share_connection(conn))
    }

    #[test]
    fn test_resolve_category_case_insensitive() {
        let repo = create_test_repository();

        assert_eq!(
            repo.resolve_category("Travel").unwrap(),
            Some("travel".to_string())
        );
        assert_eq!(
            repo.resolve_category("office supplies").unwrap(),
            Some("office-supplies".to_string())
        );
        assert_eq!(
            repo.resolve_category("MEALS").unwrap(),
            Some("meals".to_string())
        );
    }

    #[test]
    fn test_resolve_category_no_match() {
        let repo = create_test_repository();

        assert_eq!(repo.resolve_category("Entertainment").unwrap(), None);
        assert_eq!(repo.resolve_category("Trav").unwrap(), None);
        assert_eq!(repo.resolve_category("").unwrap(), None);
    }

    #[test]
    fn test_inactive_category_is_not_resolved() {
        let repo = create_test_repository();
        {
            let conn = lock_connection(&repo.conn).unwrap();
            conn.execute("UPDATE categories SET is_active = 0 WHERE id = 'other'", [])
                .unwrap();
        }

        assert_eq!(repo.resolve_category("Other").unwrap(), None);
        assert!(!repo.category_exists("other").unwrap());
        assert!(repo.category_exists("travel").unwrap());
        assert!(!repo.category_exists("missing").unwrap());
    }

    #[test]
    fn test_list_categories_ordered() {
        let repo = create_test_repository();
        let categories = repo.list_categories().unwrap();

        assert_eq!(categories.first().map(|c| c.id.as_str()), Some("travel"));
        assert!(categories
            .windows(2)
            .all(|pair| pair[0].display_order <= pair[1].display_order));
    }
}
