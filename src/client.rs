use std::collections::HashMap;

use atty::Stream;
use colored::Colorize;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use crate::error::{Result, ZenodoError};
use crate::request::RequestType;
use crate::response::ApiError;

/// Public Zenodo instance.
pub const DEFAULT_URL: &str = "https://zenodo.org";

/// Query parameter carrying the access token.
const TOKEN_PARAM: &str = "access_token";

#[derive(Debug, Clone)]
pub struct BaseClient {
    base_url: Url,
    api_token: Option<String>,
    client: Client,
}

impl BaseClient {
    pub(crate) fn has_api_token(&self) -> bool {
        self.api_token.is_some()
    }
}

// This is the base client that will be used to make requests to the API.
// It acts as a wrapper around the reqwest::Client and provides methods to
// make GET, POST, PUT, and DELETE requests. Paths are resolved against the
// base URL, absolute URLs (bucket and file links) are used as they are.
impl BaseClient {
    pub fn new(base_url: &str, api_token: Option<&String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ZenodoError::InvalidArgument(format!("Invalid URL '{base_url}': {e}")))?;
        let default_headers = Self::default_headers(api_token)?;

        // Uploads of large files need generous timeouts
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(3600))
            .connect_timeout(std::time::Duration::from_secs(60))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .default_headers(default_headers)
            .build()?;

        Ok(BaseClient {
            base_url,
            api_token: api_token.map(|s| s.to_owned()),
            client,
        })
    }

    fn default_headers(api_token: Option<&String>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(api_token) = api_token {
            let value = HeaderValue::from_str(&format!("Bearer {api_token}"))
                .map_err(|_| ZenodoError::InvalidArgument("Invalid API token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("User-Agent", HeaderValue::from_static("zenodo-rs/0.1.0"));

        Ok(headers)
    }

    /// Get the base URL of the client
    ///
    /// # Returns
    ///
    /// A reference to the base URL of the client
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends the access token to a URL.
    ///
    /// Draft files can only be downloaded through a link carrying the token
    /// as query parameter, since plain downloads do not send our headers.
    pub fn url_with_token(&self, url: &str) -> Result<String> {
        let mut url = self.resolve(url)?;
        if let Some(token) = &self.api_token {
            url.query_pairs_mut().append_pair(TOKEN_PARAM, token);
        }
        Ok(url.to_string())
    }

    pub async fn get(
        &self,
        path: &str,
        parameters: Option<HashMap<String, String>>,
        context: RequestType,
    ) -> Result<reqwest::Response> {
        self.perform_request(reqwest::Method::GET, path, parameters, context)
            .await
    }

    pub async fn post(
        &self,
        path: &str,
        parameters: Option<HashMap<String, String>>,
        context: RequestType,
    ) -> Result<reqwest::Response> {
        self.perform_request(reqwest::Method::POST, path, parameters, context)
            .await
    }

    pub async fn put(
        &self,
        path: &str,
        parameters: Option<HashMap<String, String>>,
        context: RequestType,
    ) -> Result<reqwest::Response> {
        self.perform_request(reqwest::Method::PUT, path, parameters, context)
            .await
    }

    pub async fn delete(
        &self,
        path: &str,
        parameters: Option<HashMap<String, String>>,
        context: RequestType,
    ) -> Result<reqwest::Response> {
        self.perform_request(reqwest::Method::DELETE, path, parameters, context)
            .await
    }

    // Absolute links (buckets, files, pagination) are used as they are.
    // Endpoint paths are appended to the base URL, keeping its own path.
    fn resolve(&self, path: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(path) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(url);
            }
        }

        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| ZenodoError::InvalidArgument(format!("Invalid URL '{joined}': {e}")))
    }

    async fn perform_request(
        &self,
        method: reqwest::Method,
        path: &str,
        parameters: Option<HashMap<String, String>>,
        context: RequestType,
    ) -> Result<reqwest::Response> {
        let url = self.resolve(path)?;

        // If the DEBUG environment variable is set, print the URL
        if std::env::var("DEBUG").is_ok() {
            print_call(&method, url.as_str());
        }
        tracing::debug!(%method, %url, "calling");

        let mut parameters = parameters.unwrap_or_default();
        if let Some(token) = &self.api_token {
            parameters.insert(TOKEN_PARAM.to_string(), token.clone());
        }

        let request = context
            .to_request(self.client.request(method, url))
            .await?
            .query(&parameters);

        Ok(request.send().await?)
    }
}

/// Checks the status of a response and deserializes its JSON body.
///
/// Failure statuses become an [`ApiError`]. A successful response whose body
/// cannot be read as `T` (including an empty body) becomes
/// [`ZenodoError::MalformedResponse`], which tolerant callers may swallow.
pub async fn evaluate_response<T>(response: Result<reqwest::Response>) -> Result<T>
where
    T: DeserializeOwned,
{
    let response = check_status(response?).await?;
    let url = response.url().to_string();
    let raw_content = response.text().await?;

    serde_json::from_str::<T>(&raw_content).map_err(|err| ZenodoError::MalformedResponse {
        url,
        reason: err.to_string(),
    })
}

/// Checks the status of a response whose body is not needed.
pub async fn evaluate_empty_response(response: Result<reqwest::Response>) -> Result<()> {
    check_status(response?).await.map(|_| ())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_response(status.as_u16(), &body).into())
}

fn print_call(method: &reqwest::Method, url: &str) {
    if atty::is(Stream::Stdout) {
        println!("{} {}: {}", "Calling".blue().bold(), method, url);
    }
}
