//! Request body extraction.
//!
//! # Responsibilities
//! - Decode JSON request bodies
//! - Turn decode failures into enveloped 400 responses
//!
//! # Design Decisions
//! - Body size is capped by `DefaultBodyLimit` so oversize bodies also get
//!   the JSON envelope
//! - Input types opt into `deny_unknown_fields` themselves

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::http::response::ApiError;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// JSON body extractor whose rejection is an [`ApiError::BadRequest`].
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::BadRequest(describe(&rejection))),
        }
    }
}

fn describe(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "body must be sent with Content-Type: application/json".to_string()
        }
        JsonRejection::JsonSyntaxError(_) => "body contains badly-formed JSON".to_string(),
        JsonRejection::JsonDataError(e) => e.body_text(),
        other => other.body_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Input {
        #[allow(dead_code)]
        account: String,
    }

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn syntax_error_is_bad_request() {
        let err = JsonBody::<Input>::from_request(json_request("{\"account\":"), &())
            .await
            .unwrap_err();
        match err {
            ApiError::BadRequest(message) => assert_eq!(message, "body contains badly-formed JSON"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_field_is_bad_request() {
        let err = JsonBody::<Input>::from_request(
            json_request(r#"{"account":"a@b.co","admin":true}"#),
            &(),
        )
        .await
        .unwrap_err();
        match err {
            ApiError::BadRequest(message) => assert!(message.contains("unknown field `admin`")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_content_type_is_bad_request() {
        let req = Request::builder()
            .method("POST")
            .body(Body::from("{}"))
            .unwrap();
        let err = JsonBody::<Input>::from_request(req, &()).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
