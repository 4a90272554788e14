use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::books::rating::Rating;
use crate::books::repo::Book;
use crate::error::ApiError;

const MAX_TEXT_LEN: usize = 200;

/// Book metadata as the client may send it. Identity, ownership, the rating
/// list and the average have no fields here, so whatever the client sends
/// for them is dropped during deserialization.
#[derive(Debug, Deserialize)]
pub struct BookPayload {
    pub title: String,
    pub author: String,
    pub year: i32,
    pub genre: String,
    /// Optional initial grade at creation; ignored on update.
    #[serde(default)]
    pub rating: Option<i32>,
}

impl BookPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        text_field("title", &self.title)?;
        text_field("author", &self.author)?;
        text_field("genre", &self.genre)?;
        let current_year = OffsetDateTime::now_utc().year();
        if self.year < 0 || self.year > current_year {
            return Err(ApiError::validation(format!(
                "year must be between 0 and {current_year}"
            )));
        }
        Ok(())
    }
}

fn text_field(name: &str, value: &str) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len == 0 || len > MAX_TEXT_LEN {
        return Err(ApiError::validation(format!(
            "{name} must be between 1 and {MAX_TEXT_LEN} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub genre: String,
    pub image_url: String,
    pub ratings: Vec<Rating>,
    pub average_rating: f64,
}

impl From<Book> for BookResponse {
    fn from(b: Book) -> Self {
        Self {
            id: b.id,
            owner_id: b.owner_id,
            title: b.title,
            author: b.author,
            year: b.year,
            genre: b.genre,
            image_url: b.image_url,
            ratings: b.ratings.0,
            average_rating: b.average_rating,
        }
    }
}

/// Mutations answer with an acknowledgement, not the record.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub message: &'static str,
}
