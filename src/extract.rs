//! Request extractors that report failures as [`IronDashError`]

use crate::error::IronDashError;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

/// JSON request body whose rejections become validation errors, so clients
/// always get a `400` with a JSON `{"error"}` body.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = IronDashError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl From<JsonRejection> for IronDashError {
    fn from(rejection: JsonRejection) -> Self {
        IronDashError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Target {
        #[allow(dead_code)]
        group_id: String,
    }

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_field_is_validation_error() {
        let err = ApiJson::<Target>::from_request(json_request("{}"), &())
            .await
            .unwrap_err();
        assert!(matches!(err, IronDashError::Validation(ref msg) if msg.contains("groupId")));
    }

    #[tokio::test]
    async fn test_syntax_error_is_validation_error() {
        let err = ApiJson::<serde_json::Value>::from_request(json_request("{not json"), &())
            .await
            .unwrap_err();
        assert!(matches!(err, IronDashError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_content_type_is_validation_error() {
        let req = Request::builder()
            .method("POST")
            .body(Body::from("{}"))
            .unwrap();
        let err = ApiJson::<serde_json::Value>::from_request(req, &())
            .await
            .unwrap_err();
        assert!(matches!(err, IronDashError::Validation(_)));
    }
}
