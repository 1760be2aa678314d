//! Profile lookups against the PostgREST table API.

use std::sync::Arc;

use reqwest::{Method, Url};

use super::BackendClient;
use super::auth::RestAuthProvider;
use crate::error::AuthError;
use crate::provider::ProfileStore;
use crate::types::Profile;

pub struct RestProfileStore {
    backend: BackendClient,
    table: String,
    /// Source of the member's bearer token, so row-level security sees them.
    auth: Option<Arc<RestAuthProvider>>,
}

impl RestProfileStore {
    #[must_use]
    pub fn new(backend: BackendClient, table: impl Into<String>) -> Self {
        Self { backend, table: table.into(), auth: None }
    }

    /// Authenticate lookups with the provider's current access token.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<RestAuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }
}

#[async_trait::async_trait]
impl ProfileStore for RestProfileStore {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, AuthError> {
        let url = profile_url(self.backend.base_url(), &self.table, user_id)?;
        let token = self.auth.as_ref().and_then(|a| a.access_token());
        let builder = self
            .backend
            .request(Method::GET, &url, token.as_deref())
            .header("Accept", "application/json");
        let body = BackendClient::send(builder).await?;
        parse_profile_rows(&body)
    }
}

/// `GET /rest/v1/{table}?id=eq.{id}&select=*&limit=1`
pub(crate) fn profile_url(base_url: &str, table: &str, user_id: &str) -> Result<String, AuthError> {
    let mut url = Url::parse(&format!("{base_url}/rest/v1/{table}")).map_err(|e| AuthError::ConfigParse(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("id", &format!("eq.{user_id}"))
        .append_pair("select", "*")
        .append_pair("limit", "1");
    Ok(url.into())
}

/// PostgREST answers a filtered select with an array; empty means no row.
pub(crate) fn parse_profile_rows(body: &str) -> Result<Option<Profile>, AuthError> {
    let rows: Vec<Profile> = serde_json::from_str(body).map_err(|e| AuthError::Parse(e.to_string()))?;
    Ok(rows.into_iter().next())
}

#[cfg(test)]
#[path = "profiles_test.rs"]
mod tests;
