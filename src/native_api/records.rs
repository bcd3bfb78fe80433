use serde_json::Value;

use crate::client::{evaluate_response, BaseClient};
use crate::error::Result;
use crate::native_api::licenses::SearchQuery;
use crate::native_api::page::Page;
use crate::request::RequestType;

/// Searches the published records.
pub async fn list_records(client: &BaseClient, query: &SearchQuery) -> Result<Page<Value>> {
    let response = client
        .get("api/records", Some(query.to_parameters()), RequestType::Plain)
        .await;
    evaluate_response(response).await
}

pub async fn retrieve_record(client: &BaseClient, id: i64) -> Result<Value> {
    let response = client
        .get(&format!("api/records/{id}"), None, RequestType::Plain)
        .await;
    evaluate_response(response).await
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_retrieve_record() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/records/42");
            then.status(200)
                .json_body(json!({"id": 42, "doi": "10.5281/zenodo.42"}));
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();

        let record = retrieve_record(&client, 42).await.unwrap();

        mock.assert();
        assert_eq!(record["doi"], "10.5281/zenodo.42");
    }

    #[tokio::test]
    async fn test_list_records_with_page_size() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/records")
                .query_param("size", "1");
            then.status(200).json_body(json!({
                "hits": {"hits": [{"id": 1}], "total": 10},
                "links": {"next": server.url("/api/records?size=1&page=2")}
            }));
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();
        let query = SearchQuery {
            size: Some(1),
            ..Default::default()
        };

        let page = list_records(&client, &query).await.unwrap();

        mock.assert();
        assert_eq!(page.items().len(), 1);
        assert!(page.links.next.is_some());
    }
}
