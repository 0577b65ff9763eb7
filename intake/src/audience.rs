//! Mailing-list provider client and the one-time configured audience handle.
//!
//! The provider signals "member exists", "invalid address", and "forgotten
//! email" through the `title` field of its error documents. That
//! classification happens here, at the HTTP boundary, so everything above
//! this module dispatches on [`AddMemberOutcome`] instead of matching error
//! strings.

use crate::secrets::{
    AUDIENCE_API_KEY, AUDIENCE_LIST_NAME, AUDIENCE_SERVER_PREFIX, SecretError, SecretProvider,
};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use shared::singleflight::SingleFlight;
use std::sync::Arc;
use url::Url;

const TITLE_MEMBER_EXISTS: &str = "Member Exists";
const TITLE_INVALID_RESOURCE: &str = "Invalid Resource";
const TITLE_FORGOTTEN: &str = "Forgotten Email Not Subscribed";

#[derive(thiserror::Error, Debug)]
pub enum AudienceError {
    #[error("audience request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("audience API returned HTTP {status}: {title}")]
    Api {
        status: reqwest::StatusCode,
        title: String,
    },
    #[error("no list named {0:?} exists for this account")]
    UnknownList(String),
    #[error("invalid audience API base URL: {0}")]
    InvalidBaseUrl(String),
    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// Classified result of an attempt to add a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMemberOutcome {
    /// The provider accepted the new member.
    Added,
    /// An entry for this address already exists on the list.
    MemberExists,
    /// The provider rejected the address as malformed.
    InvalidAddress,
    /// The address was permanently erased and cannot be re-subscribed.
    Forgotten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Subscribed,
    Unsubscribed,
    Pending,
    Cleaned,
    Transactional,
    Archived,
}

#[derive(Debug, Deserialize)]
pub struct MemberRecord {
    pub status: SubscriptionStatus,
}

// Error document shape shared by all provider endpoints.
#[derive(Deserialize)]
struct ProblemDocument {
    title: String,
}

#[derive(Serialize)]
struct MemberUpsert<'a> {
    email_address: &'a str,
    status: SubscriptionStatus,
}

#[derive(Deserialize)]
struct ListRecord {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ListsResponse {
    lists: Vec<ListRecord>,
}

/// Members are identified by the MD5 digest of the lower-cased address, so
/// lookup and update are case-insensitive.
pub fn member_hash(email: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(email.to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// Authenticated client for the mailing-list provider API.
pub struct AudienceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AudienceClient {
    pub fn new(base_url: &Url, api_key: String) -> Self {
        AudienceClient {
            client: reqwest::Client::new(),
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Resolves a list name to its identifier.
    pub async fn find_list_id(&self, name: &str) -> Result<String, AudienceError> {
        let url = format!("{}/lists?count=100", self.base_url);

        let response = self
            .client
            .get(&url)
            .basic_auth("intake", Some(&self.api_key))
            .send()
            .await?;
        let response = check_status(response).await?;

        let lists = response.json::<ListsResponse>().await?;

        lists
            .lists
            .into_iter()
            .find(|list| list.name == name)
            .map(|list| list.id)
            .ok_or_else(|| AudienceError::UnknownList(name.to_string()))
    }

    /// Attempts to add a subscriber, classifying the provider's known
    /// rejections into [`AddMemberOutcome`]. Unrecognized errors surface as
    /// [`AudienceError::Api`].
    pub async fn add_member(
        &self,
        list_id: &str,
        email: &str,
        status: SubscriptionStatus,
    ) -> Result<AddMemberOutcome, AudienceError> {
        let url = format!("{}/lists/{}/members", self.base_url, list_id);

        let response = self
            .client
            .post(&url)
            .basic_auth("intake", Some(&self.api_key))
            .json(&MemberUpsert {
                email_address: email,
                status,
            })
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(AddMemberOutcome::Added);
        }

        let status_code = response.status();
        let problem = response.json::<ProblemDocument>().await?;

        // The title is the provider's contract; matched by exact value.
        match problem.title.as_str() {
            TITLE_MEMBER_EXISTS => Ok(AddMemberOutcome::MemberExists),
            TITLE_INVALID_RESOURCE => Ok(AddMemberOutcome::InvalidAddress),
            TITLE_FORGOTTEN => Ok(AddMemberOutcome::Forgotten),
            _ => Err(AudienceError::Api {
                status: status_code,
                title: problem.title,
            }),
        }
    }

    /// Fetches the existing member record for an address.
    pub async fn get_member(
        &self,
        list_id: &str,
        email: &str,
    ) -> Result<MemberRecord, AudienceError> {
        let url = format!(
            "{}/lists/{}/members/{}",
            self.base_url,
            list_id,
            member_hash(email)
        );

        let response = self
            .client
            .get(&url)
            .basic_auth("intake", Some(&self.api_key))
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response.json::<MemberRecord>().await?)
    }

    /// Re-submits an existing member with a new subscription status.
    pub async fn update_member(
        &self,
        list_id: &str,
        email: &str,
        status: SubscriptionStatus,
    ) -> Result<(), AudienceError> {
        let url = format!(
            "{}/lists/{}/members/{}",
            self.base_url,
            list_id,
            member_hash(email)
        );

        let response = self
            .client
            .patch(&url)
            .basic_auth("intake", Some(&self.api_key))
            .json(&MemberUpsert {
                email_address: email,
                status,
            })
            .send()
            .await?;
        check_status(response).await?;

        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AudienceError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let title = match response.json::<ProblemDocument>().await {
        Ok(problem) => problem.title,
        Err(_) => "(no error document)".to_string(),
    };

    Err(AudienceError::Api { status, title })
}

/// Configured client bound to the audience list new subscribers go to.
pub struct Audience {
    client: AudienceClient,
    list_id: String,
}

impl Audience {
    pub fn new(client: AudienceClient, list_id: String) -> Self {
        Audience { client, list_id }
    }

    pub async fn add_member(
        &self,
        email: &str,
        status: SubscriptionStatus,
    ) -> Result<AddMemberOutcome, AudienceError> {
        self.client.add_member(&self.list_id, email, status).await
    }

    pub async fn get_member(&self, email: &str) -> Result<MemberRecord, AudienceError> {
        self.client.get_member(&self.list_id, email).await
    }

    pub async fn update_member(
        &self,
        email: &str,
        status: SubscriptionStatus,
    ) -> Result<(), AudienceError> {
        self.client.update_member(&self.list_id, email, status).await
    }
}

/// One-time configuration of the audience handle: derives credentials from
/// the secret provider, resolves the configured list name to its id, and
/// serves the same handle for the rest of the process lifetime.
pub struct AudienceProvider {
    secrets: Arc<SecretProvider>,
    api_base: Option<Url>,
    handle: SingleFlight<Arc<Audience>>,
}

impl AudienceProvider {
    pub fn new(secrets: Arc<SecretProvider>, api_base: Option<Url>) -> Self {
        AudienceProvider {
            secrets,
            api_base,
            handle: SingleFlight::new(),
        }
    }

    /// Returns the configured handle, performing the setup on first demand.
    ///
    /// Setup failures (missing secrets, unreachable API, unknown list) are
    /// not cached; the next request retries from scratch.
    pub async fn get(&self) -> Result<Arc<Audience>, AudienceError> {
        self.handle
            .get_or_try_init(|| async {
                let api_key = self.secrets.get(AUDIENCE_API_KEY).await?;
                let list_name = self.secrets.get(AUDIENCE_LIST_NAME).await?;

                let base_url = match &self.api_base {
                    Some(url) => url.clone(),
                    None => {
                        let prefix = self.secrets.get(AUDIENCE_SERVER_PREFIX).await?;
                        let derived = format!("https://{prefix}.api.mailchimp.com/3.0");
                        Url::parse(&derived)
                            .map_err(|_| AudienceError::InvalidBaseUrl(derived))?
                    }
                };

                let client = AudienceClient::new(&base_url, api_key);
                let list_id = client.find_list_id(&list_name).await?;

                Ok(Arc::new(Audience::new(client, list_id)))
            })
            .await
    }
}
