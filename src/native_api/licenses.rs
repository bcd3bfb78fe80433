use std::collections::HashMap;

use serde_json::Value;
use structopt::StructOpt;

use crate::client::{evaluate_response, BaseClient};
use crate::error::Result;
use crate::native_api::page::Page;
use crate::request::RequestType;

/// Search parameters shared by the license and record listings.
#[derive(StructOpt, Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    #[structopt(short, long, help = "Search query (Elasticsearch syntax)")]
    pub q: Option<String>,

    #[structopt(long, help = "Sort order of the results")]
    pub sort: Option<String>,

    #[structopt(long, help = "Number of results per page")]
    pub size: Option<u32>,

    #[structopt(long, help = "Page number, starting at 1")]
    pub page: Option<u32>,
}

impl SearchQuery {
    pub(crate) fn to_parameters(&self) -> HashMap<String, String> {
        let mut parameters = HashMap::new();

        if let Some(q) = &self.q {
            parameters.insert("q".to_string(), q.clone());
        }
        if let Some(sort) = &self.sort {
            parameters.insert("sort".to_string(), sort.clone());
        }
        if let Some(size) = self.size {
            parameters.insert("size".to_string(), size.to_string());
        }
        if let Some(page) = self.page {
            parameters.insert("page".to_string(), page.to_string());
        }

        parameters
    }
}

/// Searches the licenses known to the repository.
pub async fn list_licenses(client: &BaseClient, query: &SearchQuery) -> Result<Page<Value>> {
    let response = client
        .get("api/licenses", Some(query.to_parameters()), RequestType::Plain)
        .await;
    evaluate_response(response).await
}

/// Retrieves a license by identifier, e.g. `cc-by-4.0`.
pub async fn retrieve_license(client: &BaseClient, id: &str) -> Result<Value> {
    let response = client
        .get(&format!("api/licenses/{id}"), None, RequestType::Plain)
        .await;
    evaluate_response(response).await
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_list_licenses() {
        // Arrange
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/licenses")
                .query_param("q", "creative");
            then.status(200).json_body(json!({
                "hits": {"hits": [{"id": "cc-by-4.0"}, {"id": "cc-zero"}], "total": 2},
                "links": {}
            }));
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();
        let query = SearchQuery {
            q: Some("creative".to_string()),
            ..Default::default()
        };

        // Act
        let page = list_licenses(&client, &query).await.unwrap();

        // Assert
        mock.assert();
        assert_eq!(page.total(), 2);
        assert_eq!(page.items()[1]["id"], "cc-zero");
    }

    #[tokio::test]
    async fn test_retrieve_unknown_license() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/licenses/nope");
            then.status(404).json_body(json!({"status": 404, "message": "PID does not exist."}));
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();

        let err = retrieve_license(&client, "nope").await.unwrap_err();

        assert_eq!(err.status_code(), Some(404));
        assert!(err.to_string().contains("PID does not exist."));
    }
}
