//! Optional JSON request bodies
//!
//! Several POST endpoints accept an empty body. An empty body means
//! "use the defaults"; a body that is present must parse completely.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::WorkflowError;

/// JSON body that may be omitted
///
/// An absent or whitespace-only body yields `T::default()`. Anything else is
/// parsed as JSON and a syntax or shape error is a 400, never a silent default.
#[derive(Debug, Clone, Default)]
pub struct OptionalJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = WorkflowError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| WorkflowError::InvalidInput(e.body_text()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJson(T::default()));
        }

        let Json(value) = Json::<T>::from_bytes(&bytes).map_err(|e| {
            debug!(error = %e.body_text(), "Rejected request body");
            WorkflowError::InvalidInput(e.body_text())
        })?;
        Ok(OptionalJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Notes {
        #[serde(default)]
        notes: Option<String>,
        #[serde(default)]
        source_ids: Vec<i64>,
    }

    async fn extract(body: &'static str) -> Result<Notes, WorkflowError> {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(body))
            .unwrap();
        OptionalJson::<Notes>::from_request(request, &())
            .await
            .map(|OptionalJson(notes)| notes)
    }

    #[tokio::test]
    async fn test_empty_body_uses_defaults() {
        assert_eq!(extract("").await.unwrap(), Notes::default());
        assert_eq!(extract("  \n").await.unwrap(), Notes::default());
    }

    #[tokio::test]
    async fn test_valid_body_is_parsed() {
        let notes = extract(r#"{"notes":"checked","source_ids":[4]}"#).await.unwrap();
        assert_eq!(notes.notes.as_deref(), Some("checked"));
        assert_eq!(notes.source_ids, vec![4]);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        assert!(matches!(
            extract(r#"{"notes": ["a", "b"]"#).await,
            Err(WorkflowError::InvalidInput(_))
        ));
        assert!(matches!(
            extract(r#"{"source_ids":"seven"}"#).await,
            Err(WorkflowError::InvalidInput(_))
        ));
    }
}
