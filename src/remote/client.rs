//! reqwest client for the Hardcover GraphQL endpoint

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Certificate, Client};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

use super::graphql::{self, CatalogMatch, GraphqlRequest, JournalEntry};
use super::RemoteJournal;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::isbn::Isbn;

pub struct HardcoverClient {
    client: Client,
    endpoint: String,
    authorization: String,
}

impl HardcoverClient {
    /// Trusts the platform roots plus an optional pinned PEM for the host
    pub fn new(
        endpoint: &str,
        token: &str,
        ca_cert: Option<&Path>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut builder = Client::builder().timeout(timeout);

        if let Some(path) = ca_cert {
            let pem = std::fs::read(path)?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| Error::Config(format!("bad certificate {}: {}", path.display(), e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            authorization: bearer(token),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config.api_token()?;
        Self::new(
            &config.remote.endpoint,
            &token,
            config.ca_cert_path().as_deref(),
            Duration::from_secs(config.remote.timeout_secs),
        )
    }

    /// POST a request and return the raw body of a 2xx response
    async fn execute(&self, request: &GraphqlRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::RemoteStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

fn bearer(token: &str) -> String {
    let token = token.trim();
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {}", token)
    }
}

#[async_trait]
impl RemoteJournal for HardcoverClient {
    #[instrument(skip(self), fields(isbn = %isbn))]
    async fn find_edition(&self, isbn: &Isbn) -> Result<Option<CatalogMatch>> {
        let body = self.execute(&graphql::catalog_query(isbn)).await?;
        let found = graphql::parse_catalog_response(&body)?;
        debug!(?found, "catalog lookup finished");
        Ok(found)
    }

    #[instrument(skip(self, entry), fields(work_id = entry.ids.work_id, event = entry.event()))]
    async fn post_entry(&self, entry: &JournalEntry) -> Result<()> {
        let body = self.execute(&entry.mutation()).await?;
        graphql::parse_insert_response(&body)
    }
}
