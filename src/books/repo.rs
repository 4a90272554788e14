use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::books::rating::Rating;

#[derive(Debug, Clone, FromRow)]
pub struct Book {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub genre: String,
    pub image_url: String,
    pub ratings: Json<Vec<Rating>>,
    pub average_rating: f64,
    pub created_at: OffsetDateTime,
}

/// Fields stamped server-side at creation, after payload validation and
/// image processing.
#[derive(Debug)]
pub struct NewBook {
    pub owner_id: Uuid,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub genre: String,
    pub image_url: String,
    pub ratings: Vec<Rating>,
    pub average_rating: f64,
}

/// Metadata applied on update. Ratings and the average are never touched by
/// a metadata update; they move only through `replace_ratings`.
#[derive(Debug)]
pub struct BookFields {
    pub title: String,
    pub author: String,
    pub year: i32,
    pub genre: String,
    pub image_url: String,
}

const COLUMNS: &str =
    "id, owner_id, title, author, year, genre, image_url, ratings, average_rating, created_at";

pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Book>> {
    let rows = sqlx::query_as::<_, Book>(&format!(
        "SELECT {COLUMNS} FROM books ORDER BY created_at ASC"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Book>> {
    let row = sqlx::query_as::<_, Book>(&format!("SELECT {COLUMNS} FROM books WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

/// Best-rated books first; ties keep insertion order.
pub async fn top_rated(db: &PgPool, limit: i64) -> anyhow::Result<Vec<Book>> {
    let rows = sqlx::query_as::<_, Book>(&format!(
        "SELECT {COLUMNS} FROM books ORDER BY average_rating DESC, created_at ASC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn insert(db: &PgPool, book: NewBook) -> anyhow::Result<Book> {
    let row = sqlx::query_as::<_, Book>(&format!(
        r#"
        INSERT INTO books (owner_id, title, author, year, genre, image_url, ratings, average_rating)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(book.owner_id)
    .bind(&book.title)
    .bind(&book.author)
    .bind(book.year)
    .bind(&book.genre)
    .bind(&book.image_url)
    .bind(Json(&book.ratings))
    .bind(book.average_rating)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn update_fields(db: &PgPool, id: Uuid, fields: &BookFields) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE books
        SET title = $2, author = $3, year = $4, genre = $5, image_url = $6
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&fields.title)
    .bind(&fields.author)
    .bind(fields.year)
    .bind(&fields.genre)
    .bind(&fields.image_url)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn replace_ratings(
    db: &PgPool,
    id: Uuid,
    ratings: &[Rating],
    average: f64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE books SET ratings = $2, average_rating = $3 WHERE id = $1")
        .bind(id)
        .bind(Json(ratings))
        .bind(average)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM books WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}
