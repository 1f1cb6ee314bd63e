use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use chrono_tz::Asia::Tokyo;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// リポジトリ間で共有するデータベース接続
pub type SharedConnection = Arc<Mutex<Connection>>;

/// 初期登録するカテゴリー（id, 名前, 表示順）
const DEFAULT_CATEGORIES: &[(&str, &str, i64)] = &[
    ("travel", "Travel", 1),
    ("meals", "Meals", 2),
    ("lodging", "Lodging", 3),
    ("transportation", "Transportation", 4),
    ("office-supplies", "Office Supplies", 5),
    ("other", "Other", 6),
];

/// データベース接続を初期化し、テーブルを作成する
///
/// # 引数
/// * `database_path` - データベースファイルのパス
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
pub fn initialize_database(database_path: &Path) -> AppResult<Connection> {
    let conn = Connection::open(database_path)?;

    create_tables(&conn)?;

    log::info!("データベースを初期化しました: {database_path:?}");

    Ok(conn)
}

/// 接続を共有可能な形にする
pub fn share_connection(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

/// 共有接続のロックを取得する
///
/// ロックが汚染されている場合は並行処理エラーを返す
pub fn lock_connection(conn: &SharedConnection) -> AppResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| AppError::concurrency(format!("データベースロック取得エラー: {e}")))
}

/// データベーステーブルを作成する
///
/// 何度呼び出しても同じ結果になる
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    create_categories_table(conn)?;
    create_receipts_table(conn)?;
    create_indexes(conn)?;
    seed_default_categories(conn)?;

    Ok(())
}

/// カテゴリーテーブルを作成する
fn create_categories_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            display_order INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// 領収書テーブルを作成する
///
/// image_pathは作成直後から空にならない（一時パスがプレースホルダーとして入る）
fn create_receipts_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS receipts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            receipt_date TEXT NOT NULL,
            amount TEXT NOT NULL,
            category_id TEXT NOT NULL REFERENCES categories(id),
            description TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK(status IN ('pending', 'approved', 'rejected', 'reimbursed')),
            image_path TEXT NOT NULL CHECK(image_path <> ''),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// インデックスを作成する
fn create_indexes(conn: &Connection) -> AppResult<()> {
    // 重複チェック用
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_duplicate
         ON receipts(user_id, receipt_date, amount)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_status ON receipts(status)",
        [],
    )?;

    Ok(())
}

/// 既定のカテゴリーを登録する（既存の行は変更しない）
fn seed_default_categories(conn: &Connection) -> AppResult<()> {
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();

    for (id, name, display_order) in DEFAULT_CATEGORIES {
        conn.execute(
            "INSERT OR IGNORE INTO categories (id, name, display_order, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5)",
            params![id, name, display_order, now, now],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();

        assert!(table_exists(&conn, "receipts"));
        assert!(table_exists(&conn, "categories"));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, DEFAULT_CATEGORIES.len() as i64);
    }

    #[test]
    fn test_empty_image_path_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO receipts (id, user_id, receipt_date, amount, category_id, status, image_path, created_at, updated_at)
             VALUES ('r1', 'u1', '2024-03-01', '42.5', 'travel', 'pending', '', 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO receipts (id, user_id, receipt_date, amount, category_id, status, image_path, created_at, updated_at)
             VALUES ('r1', 'u1', '2024-03-01', '42.5', 'missing', 'pending', 'u1/temp/a.png', 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_initialize_database_with_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = initialize_database(temp_file.path()).unwrap();
        assert!(table_exists(&conn, "receipts"));
    }

    #[test]
    fn test_lock_connection() {
        let shared = share_connection(Connection::open_in_memory().unwrap());
        let guard = lock_connection(&shared).unwrap();
        assert!(guard.is_autocommit());
    }
}
