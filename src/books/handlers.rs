use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use sqlx::types::Json as Jsonb;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    books::{
        dto::{Ack, BookPayload, BookResponse, RatingRequest},
        extract::BookForm,
        rating,
        repo::{self, Book, BookFields, NewBook},
    },
    error::ApiError,
    images::{pipeline, store},
    state::AppState,
};

const TOP_RATED_LIMIT: i64 = 3;
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_books))
        .route("/bestrating", get(best_rating))
        .route("/:id", get(get_book))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_book))
        .route("/:id", axum::routing::put(update_book).delete(delete_book))
        .route("/:id/rating", post(rate_book))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

#[instrument(skip(state))]
pub async fn list_books(
    State(state): State<AppState>,
) -> Result<Json<Vec<BookResponse>>, ApiError> {
    let books = repo::list(&state.db).await?;
    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

#[instrument(skip(state))]
pub async fn best_rating(
    State(state): State<AppState>,
) -> Result<Json<Vec<BookResponse>>, ApiError> {
    let books = repo::top_rated(&state.db, TOP_RATED_LIMIT).await?;
    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookResponse>, ApiError> {
    let book = load_book(&state, id).await?;
    Ok(Json(BookResponse::from(book)))
}

#[instrument(skip(state, form))]
pub async fn create_book(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    form: BookForm,
) -> Result<(StatusCode, Json<Ack>), ApiError> {
    form.payload.validate()?;
    let raw = form
        .image
        .ok_or_else(|| ApiError::validation("image file is required"))?;

    let image_url = ingest_image(&state, raw).await?;

    let BookPayload {
        title,
        author,
        year,
        genre,
        rating: initial_grade,
    } = form.payload;
    let (ratings, average_rating) = rating::seed(user_id, initial_grade);

    let inserted = repo::insert(
        &state.db,
        NewBook {
            owner_id: user_id,
            title,
            author,
            year,
            genre,
            image_url: image_url.clone(),
            ratings,
            average_rating,
        },
    )
    .await;

    match inserted {
        Ok(book) => {
            info!(book_id = %book.id, owner_id = %user_id, "book created");
            Ok((StatusCode::CREATED, Json(Ack { message: "Book created" })))
        }
        Err(e) => {
            // The durable image exists but the record does not; don't leave
            // the orphan behind.
            error!(error = %e, "book insert failed, dropping processed image");
            store::remove_best_effort(state.images.as_ref(), &image_url).await;
            Err(ApiError::Internal(e))
        }
    }
}

#[instrument(skip(state, form))]
pub async fn update_book(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    form: BookForm,
) -> Result<Json<Ack>, ApiError> {
    form.payload.validate()?;
    let book = load_book(&state, id).await?;
    ensure_owner(&book, user_id)?;

    let image_url = match form.image {
        Some(raw) => {
            let new_url = ingest_image(&state, raw).await?;
            store::remove_best_effort(state.images.as_ref(), &book.image_url).await;
            new_url
        }
        None => book.image_url.clone(),
    };

    repo::update_fields(
        &state.db,
        id,
        &BookFields {
            title: form.payload.title,
            author: form.payload.author,
            year: form.payload.year,
            genre: form.payload.genre,
            image_url,
        },
    )
    .await?;

    info!(book_id = %id, owner_id = %user_id, "book updated");
    Ok(Json(Ack { message: "Book updated" }))
}

#[instrument(skip(state))]
pub async fn delete_book(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Ack>, ApiError> {
    let book = load_book(&state, id).await?;
    ensure_owner(&book, user_id)?;

    // File removal failure never blocks record removal; the record is the
    // source of truth.
    store::remove_best_effort(state.images.as_ref(), &book.image_url).await;
    repo::delete(&state.db, id).await?;

    info!(book_id = %id, owner_id = %user_id, "book deleted");
    Ok(Json(Ack { message: "Book deleted" }))
}

#[instrument(skip(state, payload))]
pub async fn rate_book(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<RatingRequest>, JsonRejection>,
) -> Result<Json<BookResponse>, ApiError> {
    let Json(payload) =
        payload.map_err(|e| ApiError::validation(format!("invalid request body: {e}")))?;

    let mut book = load_book(&state, id).await?;
    let mut ratings = book.ratings.0.clone();
    let average = rating::add_rating(&mut ratings, user_id, payload.rating)
        .map_err(|e| ApiError::validation(e.to_string()))?;

    repo::replace_ratings(&state.db, id, &ratings, average).await?;

    info!(book_id = %id, user_id = %user_id, grade = payload.rating, %average, "book rated");
    book.ratings = Jsonb(ratings);
    book.average_rating = average;
    Ok(Json(BookResponse::from(book)))
}

async fn load_book(state: &AppState, id: Uuid) -> Result<Book, ApiError> {
    repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))
}

fn ensure_owner(book: &Book, user_id: Uuid) -> Result<(), ApiError> {
    if book.owner_id != user_id {
        return Err(ApiError::forbidden("You do not own this book"));
    }
    Ok(())
}

/// Uploaded bytes → durable content file; returns the public URL. The raw
/// upload lives only in this request's memory and is dropped on return,
/// success or failure.
async fn ingest_image(state: &AppState, raw: Bytes) -> Result<String, ApiError> {
    let processed = pipeline::process(raw)
        .await
        .map_err(|e| ApiError::validation(format!("could not process image: {e}")))?;
    let filename = store::generate_filename();
    state
        .images
        .save(&filename, Bytes::from(processed))
        .await?;
    Ok(store::url_for(&filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::rating::Rating;
    use time::OffsetDateTime;

    fn book_owned_by(owner_id: Uuid) -> Book {
        Book {
            id: Uuid::new_v4(),
            owner_id,
            title: "t".into(),
            author: "a".into(),
            year: 2000,
            genre: "g".into(),
            image_url: "/images/1-x.jpg".into(),
            ratings: Jsonb(vec![Rating {
                user_id: owner_id,
                grade: 4,
            }]),
            average_rating: 4.0,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn owner_check_rejects_everyone_but_the_owner() {
        let owner = Uuid::new_v4();
        let book = book_owned_by(owner);
        assert!(ensure_owner(&book, owner).is_ok());

        let err = ensure_owner(&book, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }
}
