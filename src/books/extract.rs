use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Json,
};
use bytes::Bytes;

use crate::books::dto::BookPayload;
use crate::error::ApiError;

/// Canonical form of a book submission. Clients send either a bare JSON body
/// or, when a file is attached, a multipart body whose `book` field carries
/// the metadata as a JSON-encoded string. Both shapes normalize here, before
/// any workflow logic runs.
#[derive(Debug)]
pub struct BookForm {
    pub payload: BookPayload,
    pub image: Option<Bytes>,
}

#[async_trait]
impl<S> FromRequest<S> for BookForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if content_type.starts_with("multipart/form-data") {
            let mut mp = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(format!("invalid multipart body: {e}")))?;

            let mut payload: Option<BookPayload> = None;
            let mut image: Option<Bytes> = None;

            while let Some(field) = mp
                .next_field()
                .await
                .map_err(|e| ApiError::validation(format!("invalid multipart body: {e}")))?
            {
                let name = field.name().map(|s| s.to_string());
                match name.as_deref() {
                    Some("book") => {
                        let text = field.text().await.map_err(|e| {
                            ApiError::validation(format!("unreadable book field: {e}"))
                        })?;
                        payload = Some(serde_json::from_str(&text).map_err(|e| {
                            ApiError::validation(format!("invalid book payload: {e}"))
                        })?);
                    }
                    Some("image") => {
                        image = Some(field.bytes().await.map_err(|e| {
                            ApiError::validation(format!("unreadable image field: {e}"))
                        })?);
                    }
                    _ => {}
                }
            }

            let payload =
                payload.ok_or_else(|| ApiError::validation("book field is required"))?;
            Ok(BookForm { payload, image })
        } else {
            let Json(payload) = Json::<BookPayload>::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(format!("invalid book payload: {e}")))?;
            Ok(BookForm {
                payload,
                image: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    const BOOK_JSON: &str =
        r#"{"title":"Dune","author":"Frank Herbert","year":1965,"genre":"SF","rating":4}"#;

    fn multipart_request(parts: &[(&str, &str, &[u8])]) -> Request {
        let boundary = "grimoire-test-boundary";
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            if filename.is_empty() {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            } else {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        HttpRequest::builder()
            .method("POST")
            .uri("/")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn plain_json_body_normalizes_without_image() {
        let req = HttpRequest::builder()
            .method("PUT")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(BOOK_JSON))
            .unwrap();

        let form = BookForm::from_request(req, &()).await.unwrap();
        assert_eq!(form.payload.title, "Dune");
        assert_eq!(form.payload.rating, Some(4));
        assert!(form.image.is_none());
    }

    #[tokio::test]
    async fn multipart_body_normalizes_book_string_and_image() {
        let req = multipart_request(&[
            ("book", "", BOOK_JSON.as_bytes()),
            ("image", "cover.png", b"rawbytes"),
        ]);

        let form = BookForm::from_request(req, &()).await.unwrap();
        assert_eq!(form.payload.author, "Frank Herbert");
        assert_eq!(form.image.as_deref(), Some(b"rawbytes".as_slice()));
    }

    #[tokio::test]
    async fn multipart_without_book_field_is_rejected() {
        let req = multipart_request(&[("image", "cover.png", b"rawbytes")]);
        let err = BookForm::from_request(req, &()).await.unwrap_err();
        assert!(err.to_string().contains("book field is required"));
    }

    #[tokio::test]
    async fn malformed_book_string_is_rejected() {
        let req = multipart_request(&[("book", "", b"{not json")]);
        assert!(BookForm::from_request(req, &()).await.is_err());
    }

    #[tokio::test]
    async fn unknown_multipart_fields_are_ignored() {
        let req = multipart_request(&[
            ("junk", "", b"whatever"),
            ("book", "", BOOK_JSON.as_bytes()),
        ]);
        let form = BookForm::from_request(req, &()).await.unwrap();
        assert_eq!(form.payload.year, 1965);
        assert!(form.image.is_none());
    }
}
