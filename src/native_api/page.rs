use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::{evaluate_response, BaseClient};
use crate::error::Result;
use crate::request::RequestType;

/// One page of a paginated search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct Page<T> {
    pub hits: Hits<T>,
    #[serde(default)]
    pub links: PageLinks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct Hits<T> {
    #[serde(default = "Vec::new")]
    pub hits: Vec<T>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

impl<T: DeserializeOwned> Page<T> {
    /// Items of this page.
    pub fn items(&self) -> &[T] {
        &self.hits.hits
    }

    /// Number of items matching the search over all pages.
    pub fn total(&self) -> u64 {
        self.hits.total
    }

    /// Fetches the page `links.next` points to, if any.
    pub async fn next_page(&self, client: &BaseClient) -> Result<Option<Page<T>>> {
        match &self.links.next {
            Some(url) => {
                let response = client.get(url, None, RequestType::Plain).await;
                Ok(Some(evaluate_response::<Page<T>>(response).await?))
            }
            None => Ok(None),
        }
    }
}
