use crate::features::receipts::models::{
    DuplicateCandidate, NewReceipt, Receipt, ReceiptStatus, UpdateReceiptDto,
};
use crate::shared::database::{lock_connection, SharedConnection};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{generate_record_id, get_current_jst_timestamp};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

const RECEIPT_COLUMNS: &str = "id, user_id, receipt_date, amount, category_id, description, status, image_path, created_at, updated_at";

/// 領収書の永続化インターフェース
///
/// 登録ワークフローはこのトレイト越しにのみレコードを操作する
pub trait ReceiptRepository: Send + Sync {
    /// Pendingの領収書を作成し、生成されたIDを含むレコードを返す
    fn insert(&self, receipt: &NewReceipt) -> AppResult<Receipt>;

    fn get(&self, id: &str) -> AppResult<Receipt>;

    /// 画像パスを更新する
    fn update_image_path(&self, id: &str, image_path: &str) -> AppResult<Receipt>;

    /// Pendingの領収書の内容を更新する
    fn update_fields(&self, id: &str, dto: &UpdateReceiptDto) -> AppResult<Receipt>;

    /// 現在のステータスが`from`の場合のみ`to`に変更する
    fn transition_status(
        &self,
        id: &str,
        from: ReceiptStatus,
        to: ReceiptStatus,
    ) -> AppResult<Receipt>;

    fn delete(&self, id: &str) -> AppResult<()>;

    /// 同一ユーザー・同一日付・同一金額の領収書を取得する
    fn find_duplicates(
        &self,
        user_id: &str,
        date: NaiveDate,
        amount: Decimal,
    ) -> AppResult<Vec<DuplicateCandidate>>;

    fn find_by_user(&self, user_id: &str) -> AppResult<Vec<Receipt>>;

    fn find_by_status(&self, status: ReceiptStatus) -> AppResult<Vec<Receipt>>;

    /// 承認済みの領収書をすべて精算済みにし、件数を返す
    fn reimburse_all_approved(&self) -> AppResult<usize>;
}

/// 金額を保存用の文字列に変換する
///
/// 末尾の0を除いて正規化するため、42.50と42.5は同じ値として保存される
pub fn amount_to_db(amount: Decimal) -> String {
    amount.normalize().to_string()
}

fn map_receipt(row: &Row<'_>) -> rusqlite::Result<Receipt> {
    let amount: String = row.get(3)?;
    let amount = Decimal::from_str(&amount)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    let status: String = row.get(6)?;
    let status = ReceiptStatus::from_str(&status)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into()))?;

    Ok(Receipt {
        id: row.get(0)?,
        user_id: row.get(1)?,
        receipt_date: row.get(2)?,
        amount,
        category_id: row.get(4)?,
        description: row.get(5)?,
        status,
        image_path: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// 領収書を作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `receipt` - 領収書作成用DTO
///
/// # 戻り値
/// 作成された領収書、または失敗時はエラー
///
/// 戻り値は挿入した値から組み立てる（INSERTが成功したら必ずOkを返す）
pub fn create(conn: &Connection, receipt: &NewReceipt) -> AppResult<Receipt> {
    let id = generate_record_id();
    let now = get_current_jst_timestamp();
    let amount = receipt.amount.normalize();

    conn.execute(
        "INSERT INTO receipts (id, user_id, receipt_date, amount, category_id, description, status, image_path, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id,
            receipt.user_id,
            receipt.receipt_date,
            amount_to_db(amount),
            receipt.category_id,
            receipt.description,
            ReceiptStatus::Pending.as_str(),
            receipt.image_path,
            now,
            now
        ],
    )?;

    Ok(Receipt {
        id,
        user_id: receipt.user_id.clone(),
        receipt_date: receipt.receipt_date,
        amount,
        category_id: receipt.category_id.clone(),
        description: receipt.description.clone(),
        status: ReceiptStatus::Pending,
        image_path: receipt.image_path.clone(),
        created_at: now.clone(),
        updated_at: now,
    })
}

/// IDで領収書を取得する
pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Receipt> {
    conn.query_row(
        &format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = ?1"),
        params![id],
        map_receipt,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::not_found("領収書"),
        _ => AppError::from(e),
    })
}

/// ユーザーの領収書一覧を取得する（日付の新しい順）
pub fn find_by_user(conn: &Connection, user_id: &str) -> AppResult<Vec<Receipt>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECEIPT_COLUMNS} FROM receipts WHERE user_id = ?1
         ORDER BY receipt_date DESC, created_at DESC"
    ))?;

    let receipts = stmt.query_map(params![user_id], map_receipt)?;

    receipts
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::from)
}

/// ステータスで領収書一覧を取得する
pub fn find_by_status(conn: &Connection, status: ReceiptStatus) -> AppResult<Vec<Receipt>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECEIPT_COLUMNS} FROM receipts WHERE status = ?1
         ORDER BY receipt_date DESC, created_at DESC"
    ))?;

    let receipts = stmt.query_map(params![status.as_str()], map_receipt)?;

    receipts
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::from)
}

/// 重複候補を取得する
///
/// user_id・receipt_date・amountの完全一致のみ（許容幅なし）
pub fn find_duplicates(
    conn: &Connection,
    user_id: &str,
    date: NaiveDate,
    amount: Decimal,
) -> AppResult<Vec<DuplicateCandidate>> {
    let mut stmt = conn.prepare(
        "SELECT id, description FROM receipts
         WHERE user_id = ?1 AND receipt_date = ?2 AND amount = ?3
         ORDER BY created_at",
    )?;

    let candidates = stmt.query_map(params![user_id, date, amount_to_db(amount)], |row| {
        Ok(DuplicateCandidate {
            id: row.get(0)?,
            description: row.get(1)?,
        })
    })?;

    candidates
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::from)
}

/// 画像パスを更新する
///
/// 更新と読み直しは同じトランザクションで行い、読み直しに失敗したら更新も戻す
pub fn update_image_path(conn: &Connection, id: &str, image_path: &str) -> AppResult<Receipt> {
    let now = get_current_jst_timestamp();
    let tx = conn.unchecked_transaction()?;

    let rows_affected = tx.execute(
        "UPDATE receipts SET image_path = ?1, updated_at = ?2 WHERE id = ?3",
        params![image_path, now, id],
    )?;

    if rows_affected == 0 {
        return Err(AppError::not_found("領収書"));
    }

    let updated = find_by_id(&tx, id)?;
    tx.commit()?;
    Ok(updated)
}

/// Pendingの領収書を更新する
///
/// ステータスの確認と更新は同じUPDATE文で行う
pub fn update_fields(conn: &Connection, id: &str, dto: &UpdateReceiptDto) -> AppResult<Receipt> {
    let existing = find_by_id(conn, id)?;
    if !existing.status.is_editable() {
        return Err(not_editable(existing.status));
    }

    let now = get_current_jst_timestamp();
    let receipt_date = dto.receipt_date.unwrap_or(existing.receipt_date);
    let amount = dto.amount.unwrap_or(existing.amount);
    let category_id = dto.category_id.as_ref().unwrap_or(&existing.category_id);
    // 空白のみの説明はNULLに戻す
    let description = match dto.description.as_deref().map(str::trim) {
        Some("") => None,
        Some(text) => Some(text),
        None => existing.description.as_deref(),
    };

    let tx = conn.unchecked_transaction()?;
    let rows_affected = tx.execute(
        "UPDATE receipts SET receipt_date = ?1, amount = ?2, category_id = ?3, description = ?4, updated_at = ?5
         WHERE id = ?6 AND status = 'pending'",
        params![
            receipt_date,
            amount_to_db(amount),
            category_id,
            description,
            now,
            id
        ],
    )?;

    if rows_affected == 0 {
        // 確認後に他の操作でステータスが変わった
        let current = find_by_id(&tx, id)?;
        return Err(not_editable(current.status));
    }

    let updated = find_by_id(&tx, id)?;
    tx.commit()?;
    Ok(updated)
}

fn not_editable(status: ReceiptStatus) -> AppError {
    AppError::validation(format!("ステータスが{status}の領収書は編集できません"))
}

/// 条件付きでステータスを変更する
pub fn transition_status(
    conn: &Connection,
    id: &str,
    from: ReceiptStatus,
    to: ReceiptStatus,
) -> AppResult<Receipt> {
    let now = get_current_jst_timestamp();
    let tx = conn.unchecked_transaction()?;

    let rows_affected = tx.execute(
        "UPDATE receipts SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![to.as_str(), now, id, from.as_str()],
    )?;

    if rows_affected == 0 {
        let current = find_by_id(&tx, id)?;
        return Err(AppError::validation(format!(
            "ステータスが{}の領収書は{to}に変更できません",
            current.status
        )));
    }

    let updated = find_by_id(&tx, id)?;
    tx.commit()?;
    Ok(updated)
}

/// 領収書を削除する
pub fn delete(conn: &Connection, id: &str) -> AppResult<()> {
    let rows_affected = conn.execute("DELETE FROM receipts WHERE id = ?1", params![id])?;

    if rows_affected == 0 {
        return Err(AppError::not_found("領収書"));
    }

    Ok(())
}

/// 承認済みの領収書を一括で精算済みにする
///
/// # 戻り値
/// 更新された件数
pub fn reimburse_all_approved(conn: &Connection) -> AppResult<usize> {
    let now = get_current_jst_timestamp();

    let rows_affected = conn.execute(
        "UPDATE receipts SET status = 'reimbursed', updated_at = ?1 WHERE status = 'approved'",
        params![now],
    )?;

    Ok(rows_affected)
}

/// IDが存在するか確認する
pub fn exists(conn: &Connection, id: &str) -> AppResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM receipts WHERE id = ?1",
            params![id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    Ok(found.is_some())
}

/// SQLiteを使った領収書リポジトリ
#[derive(Clone)]
pub struct SqliteReceiptRepository {
    conn: SharedConnection,
}

impl SqliteReceiptRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    pub fn exists(&self, id: &str) -> AppResult<bool> {
        let conn = lock_connection(&self.conn)?;
        exists(&conn, id)
    }
}

impl ReceiptRepository for SqliteReceiptRepository {
    fn insert(&self, receipt: &NewReceipt) -> AppResult<Receipt> {
        let conn = lock_connection(&self.conn)?;
        create(&conn, receipt)
    }

    fn get(&self, id: &str) -> AppResult<Receipt> {
        let conn = lock_connection(&self.conn)?;
        find_by_id(&conn, id)
    }

    fn update_image_path(&self, id: &str, image_path: &str) -> AppResult<Receipt> {
        let conn = lock_connection(&self.conn)?;
        update_image_path(&conn, id, image_path)
    }

    fn update_fields(&self, id: &str, dto: &UpdateReceiptDto) -> AppResult<Receipt> {
        let conn = lock_connection(&self.conn)?;
        update_fields(&conn, id, dto)
    }

    fn transition_status(
        &self,
        id: &str,
        from: ReceiptStatus,
        to: ReceiptStatus,
    ) -> AppResult<Receipt> {
        let conn = lock_connection(&self.conn)?;
        transition_status(&conn, id, from, to)
    }

    fn delete(&self, id: &str) -> AppResult<()> {
        let conn = lock_connection(&self.conn)?;
        delete(&conn, id)
    }

    fn find_duplicates(
        &self,
        user_id: &str,
        date: NaiveDate,
        amount: Decimal,
    ) -> AppResult<Vec<DuplicateCandidate>> {
        let conn = lock_connection(&self.conn)?;
        find_duplicates(&conn, user_id, date, amount)
    }

    fn find_by_user(&self, user_id: &str) -> AppResult<Vec<Receipt>> {
        let conn = lock_connection(&self.conn)?;
        find_by_user(&conn, user_id)
    }

    fn find_by_status(&self, status: ReceiptStatus) -> AppResult<Vec<Receipt>> {
        let conn = lock_connection(&self.conn)?;
        find_by_status(&conn, status)
    }

    fn reimburse_all_approved(&self) -> AppResult<usize> {
        let conn = lock_connection(&self.conn)?;
        reimburse_all_approved(&conn)
    }
}
