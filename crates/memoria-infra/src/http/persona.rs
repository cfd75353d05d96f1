//! Persona recomposition trigger over HTTP.

use memoria_core::extraction::collaborator::{PersonaError, PersonaTrigger, PersonaUpdateOptions};
use memoria_types::config::PersonaConfig;
use serde::Serialize;
use tracing::debug;

use super::{client_with_timeout, is_transient_send_error, is_transient_status};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersonaUpdateBody<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    options: &'a PersonaUpdateOptions,
}

/// POSTs to `{base_url}{path}`. The response body is not read.
pub struct HttpPersonaTrigger {
    path: String,
    http: reqwest::Client,
}

impl HttpPersonaTrigger {
    pub fn new(config: &PersonaConfig) -> Self {
        Self {
            path: config.path.clone(),
            http: client_with_timeout(config.timeout_secs),
        }
    }

    fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path)
    }
}

impl PersonaTrigger for HttpPersonaTrigger {
    #[tracing::instrument(skip(self, options), fields(memory_extraction.user_id = %user_id))]
    async fn trigger_persona_update(
        &self,
        user_id: &str,
        base_url: &str,
        options: &PersonaUpdateOptions,
    ) -> Result<(), PersonaError> {
        if base_url.trim().is_empty() {
            debug!("no base url on request, skipping persona update");
            return Ok(());
        }

        let response = self
            .http
            .post(self.url(base_url))
            .json(&PersonaUpdateBody { user_id, options })
            .send()
            .await
            .map_err(|e| {
                if is_transient_send_error(&e) {
                    PersonaError::Unavailable(e.to_string())
                } else {
                    PersonaError::Rejected(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if is_transient_status(status) {
            Err(PersonaError::Unavailable(format!("persona service returned {status}")))
        } else {
            Err(PersonaError::Rejected(format!("persona service returned {status}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::Json;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use serde_json::Value;

    use super::*;
    use crate::http::serve_stub;

    fn trigger() -> HttpPersonaTrigger {
        HttpPersonaTrigger::new(&PersonaConfig {
            path: "/api/v1/persona/recompose".to_string(),
            timeout_secs: 5,
        })
    }

    #[test]
    fn url_joins_base_and_path() {
        assert_eq!(
            trigger().url("http://chat.local/"),
            "http://chat.local/api/v1/persona/recompose"
        );
    }

    #[tokio::test]
    async fn posts_user_and_options() {
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let recorded = Arc::clone(&seen);
        let router = Router::new().route(
            "/api/v1/persona/recompose",
            post(move |Json(body): Json<Value>| {
                let recorded = Arc::clone(&recorded);
                async move {
                    recorded.lock().unwrap().push(body);
                    StatusCode::ACCEPTED
                }
            }),
        );
        let base = serve_stub(router).await;

        let options = PersonaUpdateOptions {
            async_task_id: None,
            topic_count: 4,
            user_initiated: true,
        };
        trigger().trigger_persona_update("u1", &base, &options).await.unwrap();

        let bodies = seen.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["userId"], "u1");
        assert_eq!(bodies[0]["topicCount"], 4);
        assert_eq!(bodies[0]["userInitiated"], true);
    }

    #[tokio::test]
    async fn failure_status_is_classified() {
        let router = Router::new().route(
            "/api/v1/persona/recompose",
            post(|| async { StatusCode::BAD_GATEWAY }),
        );
        let base = serve_stub(router).await;

        let err = trigger()
            .trigger_persona_update("u1", &base, &PersonaUpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PersonaError::Unavailable(_)));
    }

    #[tokio::test]
    async fn empty_base_url_is_skipped() {
        trigger()
            .trigger_persona_update("u1", "", &PersonaUpdateOptions::default())
            .await
            .unwrap();
    }
}
