use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::routes::user::model::PERMISSION_ADMIN;
use crate::utils::{now_millis, retry::with_retry};

/// 图书起始编号，新书编号在现有最大值上递增
const BOOK_ID_BASE: i64 = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i64,
    pub book_id: i64,
    pub title: String,
    pub author: String,
    pub description: String,
    pub pic: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub book_type: String,
    pub price: i32,
    pub count: i32,
    pub borrow_count: i32,
}

/// 借阅记录，归还是一次性的终态变更
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BorrowRecord {
    pub id: i64,
    pub book_id: i64,
    pub username: String,
    pub borrow_time: i64,
    pub borrow_long: i32,
    pub return_time: Option<i64>,
    pub is_return: bool,
    pub is_time_out: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub description: String,
    pub pic: String,
    #[serde(rename = "type")]
    pub book_type: String,
    pub price: i32,
    pub count: i32,
}

#[derive(Debug, Deserialize)]
pub struct AddBooksRequest {
    pub data: Vec<NewBook>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBookRequest {
    pub book_id: i64,
    pub title: String,
    pub author: String,
    pub description: String,
    pub pic: String,
    #[serde(rename = "type")]
    pub book_type: String,
    pub price: i32,
    pub count: i32,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBookQuery {
    pub book_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct BorrowBookRequest {
    pub book_id: i64,
    /// 借期，天数
    pub borrow_long: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReturnBookRequest {
    pub book_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
}

pub async fn list_books(pool: &PgPool) -> Result<Vec<Book>, sqlx::Error> {
    with_retry("查询图书列表", || {
        let pool = pool.clone();
        async move {
            sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY book_id")
                .fetch_all(&pool)
                .await
        }
    })
    .await
}

pub async fn search_books(pool: &PgPool, keyword: &str) -> Result<Vec<Book>, sqlx::Error> {
    let pattern = format!("%{keyword}%");
    with_retry("搜索图书", || {
        let pool = pool.clone();
        let pattern = pattern.clone();
        async move {
            sqlx::query_as::<_, Book>(
                r#"
                SELECT * FROM books
                WHERE title ILIKE $1 OR author ILIKE $1 OR description ILIKE $1
                ORDER BY book_id
                "#,
            )
            .bind(pattern)
            .fetch_all(&pool)
            .await
        }
    })
    .await
}

/// 批量入库，编号在现有最大值基础上递增分配
pub async fn add_books(pool: &PgPool, books: &[NewBook]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let max_id: Option<i64> = sqlx::query_scalar("SELECT MAX(book_id) FROM books")
        .fetch_one(&mut *tx)
        .await?;
    let mut next_id = max_id.unwrap_or(BOOK_ID_BASE);

    for book in books {
        next_id += 1;
        sqlx::query(
            r#"
            INSERT INTO books (book_id, title, author, description, pic, type, price, count, borrow_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0)
            "#,
        )
        .bind(next_id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.pic)
        .bind(&book.book_type)
        .bind(book.price)
        .bind(book.count)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

pub async fn update_book(pool: &PgPool, req: &UpdateBookRequest) -> Result<bool, sqlx::Error> {
    with_retry("更新图书", || {
        let pool = pool.clone();
        let req = req.clone();
        async move {
            let result = sqlx::query(
                r#"
                UPDATE books
                SET title = $1, author = $2, description = $3, pic = $4,
                    type = $5, price = $6, count = $7
                WHERE book_id = $8
                "#,
            )
            .bind(req.title)
            .bind(req.author)
            .bind(req.description)
            .bind(req.pic)
            .bind(req.book_type)
            .bind(req.price)
            .bind(req.count)
            .bind(req.book_id)
            .execute(&pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }
    })
    .await
}

/// 删除图书，还有在借副本时拒绝
pub async fn delete_book(pool: &PgPool, book_id: i64) -> Result<bool, sqlx::Error> {
    with_retry("删除图书", || {
        let pool = pool.clone();
        async move {
            let result = sqlx::query("DELETE FROM books WHERE book_id = $1 AND borrow_count = 0")
                .bind(book_id)
                .execute(&pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    })
    .await
}

/// 借书：加计数与插借阅记录在同一事务内完成
///
/// 不变式：一本书的 borrow_count 等于它未归还的借阅记录数。
/// FOR UPDATE 锁行，避免并发借阅超发。
pub async fn borrow_book(
    pool: &PgPool,
    book_id: i64,
    borrow_long: i32,
    username: &str,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row: Option<(i32, i32)> = sqlx::query_as(
        "SELECT borrow_count, count FROM books WHERE book_id = $1 FOR UPDATE",
    )
    .bind(book_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((borrow_count, count)) = row else {
        return Ok(false);
    };
    if count - borrow_count <= 0 {
        return Ok(false);
    }

    sqlx::query("UPDATE books SET borrow_count = borrow_count + 1 WHERE book_id = $1")
        .bind(book_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO circulate (book_id, username, borrow_time, borrow_long, is_return, is_time_out)
        VALUES ($1, $2, $3, $4, FALSE, FALSE)
        "#,
    )
    .bind(book_id)
    .bind(username)
    .bind(now_millis())
    .bind(borrow_long)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// 还书：关最新一条未归还记录并减计数，同一事务内完成
pub async fn return_book(pool: &PgPool, book_id: i64, username: &str) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let record: Option<(i64, i64, i32)> = sqlx::query_as(
        r#"
        SELECT id, borrow_time, borrow_long
        FROM circulate
        WHERE book_id = $1 AND username = $2 AND is_return = FALSE
        ORDER BY borrow_time DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(book_id)
    .bind(username)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((record_id, borrow_time, borrow_long)) = record else {
        return Ok(false);
    };

    let return_time = now_millis();
    let is_time_out = return_time - borrow_time > i64::from(borrow_long) * 24 * 60 * 60 * 1000;

    sqlx::query(
        "UPDATE circulate SET return_time = $1, is_return = TRUE, is_time_out = $2 WHERE id = $3",
    )
    .bind(return_time)
    .bind(is_time_out)
    .bind(record_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE books SET borrow_count = borrow_count - 1 WHERE book_id = $1")
        .bind(book_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// 借阅记录：管理员看全量，普通用户只看自己的
pub async fn circulate_list(
    pool: &PgPool,
    username: &str,
    permission: i32,
) -> Result<Vec<BorrowRecord>, sqlx::Error> {
    with_retry("查询借阅记录", || {
        let pool = pool.clone();
        let username = username.to_string();
        async move {
            if permission <= PERMISSION_ADMIN {
                sqlx::query_as::<_, BorrowRecord>(
                    "SELECT * FROM circulate ORDER BY borrow_time DESC",
                )
                .fetch_all(&pool)
                .await
            } else {
                sqlx::query_as::<_, BorrowRecord>(
                    "SELECT * FROM circulate WHERE username = $1 ORDER BY borrow_time DESC",
                )
                .bind(username)
                .fetch_all(&pool)
                .await
            }
        }
    })
    .await
}
