//! HTTP client for the Cloud Build API.

use crate::wire::{
    ErrorEnvelope, ListTriggersResponse, Operation, REVISION_ID, RepoSource, WireBuild,
};
use async_trait::async_trait;
use cascade_core::ports::{BuildBackend, BuildOperation, TriggerHandle};
use cascade_core::revision::RevisionSelector;
use cascade_core::status::BuildStatus;
use cascade_core::{Error, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://cloudbuild.googleapis.com";

/// Environment variable holding the OAuth2 access token used as bearer
/// credentials, e.g. the output of `gcloud auth print-access-token`.
pub const TOKEN_ENV: &str = "CLOUDBUILD_ACCESS_TOKEN";

pub struct CloudBuildClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl CloudBuildClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
        }
    }

    /// Credentials from the environment, when present.
    pub fn from_env() -> Self {
        Self::new(std::env::var(TOKEN_ENV).ok())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/v1{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        req
    }

    /// Send a request and decode the body, turning non-2xx responses
    /// into backend errors carrying the API's own message.
    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let res = req
            .send()
            .await
            .map_err(|err| Error::Backend(err.to_string()))?;

        let status = res.status();
        if status.is_success() {
            res.json::<T>()
                .await
                .map_err(|err| Error::Backend(err.to_string()))
        } else {
            let body = res.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            Err(Error::Backend(format!("{}: {}", status, message)))
        }
    }
}

#[async_trait]
impl BuildBackend for CloudBuildClient {
    async fn list_triggers(&self, project_id: &str) -> Result<HashMap<String, TriggerHandle>> {
        let response: ListTriggersResponse = self
            .send(self.request(
                reqwest::Method::GET,
                &format!("/projects/{}/triggers", project_id),
            ))
            .await?;

        debug!(project_id, count = response.triggers.len(), "listed triggers");
        Ok(response
            .triggers
            .into_iter()
            .map(|trigger| {
                (
                    format!("{}/{}", project_id, trigger.name),
                    TriggerHandle {
                        id: trigger.id,
                        name: trigger.name,
                    },
                )
            })
            .collect())
    }

    async fn trigger_build(
        &self,
        project_id: &str,
        trigger_id: &str,
        revision: &RevisionSelector,
    ) -> Result<BuildOperation> {
        let source = RepoSource::from(revision);
        let operation: Operation = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/projects/{}/triggers/{}:run", project_id, trigger_id),
                )
                .json(&source),
            )
            .await?;

        if let Some(error) = operation.error {
            return Err(Error::Backend(error.message));
        }
        let build = operation
            .metadata
            .and_then(|metadata| metadata.build)
            .ok_or_else(|| Error::Backend("operation carries no build".to_string()))?;

        let commit_sha = build
            .substitutions
            .get(REVISION_ID)
            .cloned()
            .unwrap_or_default();
        Ok(BuildOperation {
            id: build.id,
            log_url: build.log_url,
            commit_sha,
        })
    }

    async fn build_status(&self, project_id: &str, build_id: &str) -> Result<BuildStatus> {
        let build: WireBuild = self
            .send(self.request(
                reqwest::Method::GET,
                &format!("/projects/{}/builds/{}", project_id, build_id),
            ))
            .await?;
        Ok(build.status.unwrap_or(BuildStatus::StatusUnknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> CloudBuildClient {
        CloudBuildClient::new(Some("token-123".to_string())).with_base_url(server.uri())
    }

    #[tokio::test]
    async fn lists_triggers_keyed_by_project_and_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/acme/triggers"))
            .and(header("Authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "triggers": [
                    {"id": "t1", "name": "build-all"},
                    {"id": "t2", "name": "deploy-all"}
                ]
            })))
            .mount(&server)
            .await;

        let triggers = client(&server).await.list_triggers("acme").await.unwrap();
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers["acme/build-all"].id, "t1");
        assert_eq!(triggers["acme/deploy-all"].name, "deploy-all");
    }

    #[tokio::test]
    async fn trigger_build_posts_the_revision_selector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/acme/triggers/t1:run"))
            .and(body_json(serde_json::json!({"branchName": "develop"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operations/build/acme/xyz",
                "metadata": {
                    "build": {
                        "id": "b-1",
                        "status": "QUEUED",
                        "logUrl": "https://logs/b-1",
                        "substitutions": {"REVISION_ID": "deadbeef"}
                    }
                }
            })))
            .mount(&server)
            .await;

        let build = client(&server)
            .await
            .trigger_build(
                "acme",
                "t1",
                &RevisionSelector::BranchName("develop".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(build.id, "b-1");
        assert_eq!(build.log_url, "https://logs/b-1");
        assert_eq!(build.commit_sha, "deadbeef");
    }

    #[tokio::test]
    async fn trigger_build_sends_commit_sha_when_pinned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/acme/triggers/t1:run"))
            .and(body_json(serde_json::json!({"commitSha": "deadbeef"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "metadata": {"build": {"id": "b-2", "logUrl": "https://logs/b-2"}}
            })))
            .mount(&server)
            .await;

        let build = client(&server)
            .await
            .trigger_build(
                "acme",
                "t1",
                &RevisionSelector::CommitSha("deadbeef".to_string()),
            )
            .await
            .unwrap();
        // No REVISION_ID substitution on this build.
        assert_eq!(build.commit_sha, "");
    }

    #[tokio::test]
    async fn api_errors_surface_the_embedded_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/acme/triggers/t1:run"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "caller lacks permission", "status": "PERMISSION_DENIED"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .trigger_build(
                "acme",
                "t1",
                &RevisionSelector::BranchName("develop".to_string()),
            )
            .await
            .unwrap_err();

        match err {
            Error::Backend(message) => assert!(message.contains("caller lacks permission")),
            other => panic!("expected backend error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn build_status_parses_the_wire_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/acme/builds/b-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "b-1",
                "status": "WORKING"
            })))
            .mount(&server)
            .await;

        let status = client(&server)
            .await
            .build_status("acme", "b-1")
            .await
            .unwrap();
        assert_eq!(status, BuildStatus::Working);
    }

    #[tokio::test]
    async fn missing_status_reads_as_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/acme/builds/b-9"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "b-9", "logUrl": ""})),
            )
            .mount(&server)
            .await;

        let status = client(&server)
            .await
            .build_status("acme", "b-9")
            .await
            .unwrap();
        assert_eq!(status, BuildStatus::StatusUnknown);
    }
}
