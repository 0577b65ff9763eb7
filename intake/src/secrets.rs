//! Batched retrieval of the service's secrets from the external parameter
//! store, fetched once per process lifetime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::singleflight::SingleFlight;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Outbound email provider API key
pub const EMAIL_API_KEY: &str = "email-api-key";
/// Mailing-list provider API key
pub const AUDIENCE_API_KEY: &str = "audience-api-key";
/// Mailing-list provider server prefix, used to derive the API base URL
pub const AUDIENCE_SERVER_PREFIX: &str = "audience-server-prefix";
/// Name of the audience list new subscribers are added to
pub const AUDIENCE_LIST_NAME: &str = "audience-list-name";

/// Every parameter the service requires. The batch fetch must return all of
/// them; a partial response is a configuration error, never a default.
pub const REQUIRED_PARAMETERS: &[&str] = &[
    EMAIL_API_KEY,
    AUDIENCE_API_KEY,
    AUDIENCE_SERVER_PREFIX,
    AUDIENCE_LIST_NAME,
];

#[derive(thiserror::Error, Debug)]
pub enum ParameterStoreError {
    #[error("parameter store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("parameter store returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

#[derive(thiserror::Error, Debug)]
pub enum SecretError {
    #[error(transparent)]
    Store(#[from] ParameterStoreError),
    #[error("missing required parameters: {}", names.join(", "))]
    MissingParameters { names: Vec<String> },
    #[error("parameter not declared in the required set: {0}")]
    UndeclaredParameter(String),
}

/// External key/value store the secrets are fetched from.
///
/// Implementations must support batched retrieval and honor the decryption
/// flag; secret values are always requested decrypted.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn fetch(
        &self,
        names: &[&str],
        decrypt: bool,
    ) -> Result<HashMap<String, String>, ParameterStoreError>;
}

#[derive(Serialize)]
struct FetchRequest<'a> {
    names: &'a [&'a str],
    with_decryption: bool,
}

#[derive(Deserialize)]
struct FetchedParameter {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct FetchResponse {
    parameters: Vec<FetchedParameter>,
}

/// Parameter store reached over HTTP.
pub struct HttpParameterStore {
    client: reqwest::Client,
    url: Url,
}

impl HttpParameterStore {
    pub fn new(url: Url) -> Self {
        HttpParameterStore {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl ParameterStore for HttpParameterStore {
    async fn fetch(
        &self,
        names: &[&str],
        decrypt: bool,
    ) -> Result<HashMap<String, String>, ParameterStoreError> {
        let request = FetchRequest {
            names,
            with_decryption: decrypt,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ParameterStoreError::Status(response.status()));
        }

        let fetched = response.json::<FetchResponse>().await?;

        Ok(fetched
            .parameters
            .into_iter()
            .map(|p| (p.name, p.value))
            .collect())
    }
}

/// Serves individual secrets out of one batched, process-lifetime fetch.
pub struct SecretProvider {
    store: Arc<dyn ParameterStore>,
    values: SingleFlight<Arc<HashMap<String, String>>>,
}

impl SecretProvider {
    pub fn new(store: Arc<dyn ParameterStore>) -> Self {
        SecretProvider {
            store,
            values: SingleFlight::new(),
        }
    }

    /// Looks up one secret, triggering the batched fetch on first use.
    ///
    /// The first call (for any key) fetches every declared parameter in one
    /// decrypted batch. A response missing any required parameter fails with
    /// the full list of missing names and commits nothing, so a later call
    /// retries once the store is fixed. Requests for keys outside
    /// [`REQUIRED_PARAMETERS`] are rejected rather than silently fetched
    /// one-off.
    pub async fn get(&self, name: &str) -> Result<String, SecretError> {
        let values = self
            .values
            .get_or_try_init(|| async {
                let fetched = self.store.fetch(REQUIRED_PARAMETERS, true).await?;

                let missing: Vec<String> = REQUIRED_PARAMETERS
                    .iter()
                    .filter(|name| !fetched.contains_key(**name))
                    .map(|name| name.to_string())
                    .collect();
                if !missing.is_empty() {
                    return Err(SecretError::MissingParameters { names: missing });
                }

                Ok(Arc::new(fetched))
            })
            .await?;

        values
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::UndeclaredParameter(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // In-memory store for exercising the provider without HTTP.
    struct StaticStore {
        values: HashMap<String, String>,
        fetches: AtomicUsize,
        fail_next: AtomicBool,
    }

    impl StaticStore {
        fn with_all_required() -> Self {
            let values = REQUIRED_PARAMETERS
                .iter()
                .map(|name| (name.to_string(), format!("value-of-{name}")))
                .collect();
            StaticStore {
                values,
                fetches: AtomicUsize::new(0),
                fail_next: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ParameterStore for StaticStore {
        async fn fetch(
            &self,
            names: &[&str],
            _decrypt: bool,
        ) -> Result<HashMap<String, String>, ParameterStoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(ParameterStoreError::Status(
                    reqwest::StatusCode::SERVICE_UNAVAILABLE,
                ));
            }
            Ok(names
                .iter()
                .filter_map(|name| {
                    self.values
                        .get(*name)
                        .map(|value| (name.to_string(), value.clone()))
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_one_fetch_serves_every_key() {
        let store = Arc::new(StaticStore::with_all_required());
        let provider = SecretProvider::new(store.clone());

        for name in REQUIRED_PARAMETERS {
            let value = provider.get(name).await.unwrap();
            assert_eq!(value, format!("value-of-{name}"));
        }

        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_parameters_are_named() {
        let mut store = StaticStore::with_all_required();
        store.values.remove(AUDIENCE_API_KEY);
        store.values.remove(AUDIENCE_LIST_NAME);
        let provider = SecretProvider::new(Arc::new(store));

        let err = provider.get(EMAIL_API_KEY).await.unwrap_err();
        match err {
            SecretError::MissingParameters { names } => {
                assert_eq!(names, vec![AUDIENCE_API_KEY, AUDIENCE_LIST_NAME]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_retries_on_next_call() {
        let store = Arc::new(StaticStore::with_all_required());
        store.fail_next.store(true, Ordering::SeqCst);
        let provider = SecretProvider::new(store.clone());

        assert!(provider.get(EMAIL_API_KEY).await.is_err());

        // The failure was not cached; the next call fetches again.
        let value = provider.get(EMAIL_API_KEY).await.unwrap();
        assert_eq!(value, format!("value-of-{EMAIL_API_KEY}"));
        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_undeclared_parameter_is_rejected() {
        let provider = SecretProvider::new(Arc::new(StaticStore::with_all_required()));

        let err = provider.get("database-password").await.unwrap_err();
        assert!(matches!(err, SecretError::UndeclaredParameter(_)));
    }

    #[tokio::test]
    async fn test_http_store_requests_decryption() {
        let mock_server = MockServer::start().await;

        let response_body = serde_json::json!({
            "parameters": [
                {"name": "email-api-key", "value": "sg-key"},
                {"name": "audience-api-key", "value": "mc-key"},
            ]
        });

        Mock::given(method("POST"))
            .and(path("/fetch"))
            .and(body_json(serde_json::json!({
                "names": ["email-api-key", "audience-api-key"],
                "with_decryption": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/fetch", mock_server.uri())).unwrap();
        let store = HttpParameterStore::new(url);
        let values = store
            .fetch(&[EMAIL_API_KEY, AUDIENCE_API_KEY], true)
            .await
            .unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values[EMAIL_API_KEY], "sg-key");
        assert_eq!(values[AUDIENCE_API_KEY], "mc-key");
    }

    #[tokio::test]
    async fn test_http_store_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/fetch"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/fetch", mock_server.uri())).unwrap();
        let store = HttpParameterStore::new(url);
        let err = store.fetch(REQUIRED_PARAMETERS, true).await.unwrap_err();

        assert!(matches!(err, ParameterStoreError::Status(status) if status == 500));
    }
}
