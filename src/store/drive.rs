//! Google Drive v3 implementation of [`ObjectStore`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::auth::TokenProvider;
use super::error::check_status;
use super::{ObjectStore, StoreError};
use crate::retry::{self, RetryAction, RetryConfig};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
const LIST_PAGE_SIZE: &str = "1000";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    #[serde(default)]
    id: String,
    name: Option<String>,
}

pub struct GoogleDrive {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    api_root: String,
    upload_root: String,
    retry: RetryConfig,
}

impl GoogleDrive {
    pub fn new(client: Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_roots(client, tokens, DRIVE_API, DRIVE_UPLOAD_API)
    }

    pub fn with_roots(
        client: Client,
        tokens: Arc<dyn TokenProvider>,
        api_root: &str,
        upload_root: &str,
    ) -> Self {
        Self {
            client,
            tokens,
            api_root: api_root.trim_end_matches('/').to_string(),
            upload_root: upload_root.trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn list_page(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<FileList, StoreError> {
        let token = self.tokens.access_token().await?;
        let mut request = self
            .client
            .get(format!("{}/files", self.api_root))
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("pageSize", LIST_PAGE_SIZE),
                ("fields", "nextPageToken, files(id, name)"),
            ]);
        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }
        let response = check_status(request.send().await?, "files.list").await?;
        Ok(response.json().await?)
    }

    async fn upload_once(&self, body: Vec<u8>, boundary: &str) -> Result<String, StoreError> {
        #[derive(Deserialize)]
        struct Created {
            id: String,
        }

        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(format!("{}/files", self.upload_root))
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;
        let created: Created = check_status(response, "files.create").await?.json().await?;
        Ok(created.id)
    }
}

fn classify(e: &StoreError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

/// `multipart/related` body carrying the JSON metadata and the PDF bytes.
fn multipart_body(metadata: &serde_json::Value, bytes: &[u8], boundary: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n\
             --{b}\r\nContent-Type: application/pdf\r\n\r\n",
            b = boundary,
            meta = metadata
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[async_trait]
impl ObjectStore for GoogleDrive {
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<(String, String)>, StoreError> {
        let query = format!("'{}' in parents and trashed = false", folder_id);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = retry::retry_with_backoff(&self.retry, classify, || {
                self.list_page(&query, page_token.as_deref())
            })
            .await?;
            entries.extend(
                page.files
                    .into_iter()
                    .filter_map(|f| f.name.map(|name| (name, f.id))),
            );
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        tracing::debug!(folder = folder_id, count = entries.len(), "Listed storage folder");
        Ok(entries)
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        folder_id: &str,
    ) -> Result<String, StoreError> {
        let boundary = format!("invoice-harvester-{:016x}", rand::random::<u64>());
        let metadata = serde_json::json!({ "name": name, "parents": [folder_id] });
        let body = multipart_body(&metadata, &bytes, &boundary);

        let id = retry::retry_with_backoff(&self.retry, classify, || {
            self.upload_once(body.clone(), &boundary)
        })
        .await?;
        tracing::debug!(name, id = %id, "Uploaded file");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        retry::retry_with_backoff(&self.retry, classify, || async {
            let token = self.tokens.access_token().await?;
            let response = self
                .client
                .get(format!("{}/files/{}", self.api_root, id))
                .bearer_auth(token)
                .query(&[("alt", "media")])
                .send()
                .await?;
            let bytes = check_status(response, "files.get").await?.bytes().await?;
            Ok::<_, StoreError>(bytes.to_vec())
        })
        .await
    }

    async fn name(&self, id: &str) -> Result<Option<String>, StoreError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(format!("{}/files/{}", self.api_root, id))
            .bearer_auth(token)
            .query(&[("fields", "name")])
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let file: DriveFile = check_status(response, "files.get").await?.json().await?;
        Ok(file.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::auth::StaticToken;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, header_regex, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn drive(server: &MockServer) -> GoogleDrive {
        GoogleDrive::with_roots(
            Client::new(),
            Arc::new(StaticToken("tok")),
            &format!("{}/drive/v3", server.uri()),
            &format!("{}/upload/drive/v3", server.uri()),
        )
        .with_retry(RetryConfig {
            max_retries: 1,
            base_delay_secs: 0,
            max_delay_secs: 0,
            backoff: retry::Backoff::Exponential,
        })
    }

    #[tokio::test]
    async fn test_list_folder_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [{"id": "id2", "name": "b.pdf"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("q", "'folder1' in parents and trashed = false"))
            .and(query_param("pageSize", "1000"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [{"id": "id1", "name": "a.pdf"}],
                "nextPageToken": "p2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let listing = drive(&server).list_folder("folder1").await.unwrap();
        assert_eq!(
            listing,
            vec![
                ("a.pdf".to_string(), "id1".to_string()),
                ("b.pdf".to_string(), "id2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_related() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "multipart"))
            .and(header_regex("content-type", "^multipart/related; boundary="))
            .and(body_string_contains("\"name\":\"2024-05_C1_9.pdf\""))
            .and(body_string_contains("\"parents\":[\"folder1\"]"))
            .and(body_string_contains("%PDF-1.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new-id"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = drive(&server)
            .upload(b"%PDF-1.7".to_vec(), "2024-05_C1_9.pdf", "folder1")
            .await
            .unwrap();
        assert_eq!(id, "new-id");
    }

    #[tokio::test]
    async fn test_upload_retries_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "after-retry"})))
            .mount(&server)
            .await;

        let id = drive(&server)
            .upload(b"%PDF".to_vec(), "x.pdf", "f")
            .await
            .unwrap();
        assert_eq!(id, "after-retry");
    }

    #[tokio::test]
    async fn test_get_and_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/abc"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-data".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/abc"))
            .and(query_param("fields", "name"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "orig.pdf"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let d = drive(&server);
        assert_eq!(d.get("abc").await.unwrap(), b"%PDF-data".to_vec());
        assert_eq!(d.name("abc").await.unwrap().as_deref(), Some("orig.pdf"));
        assert_eq!(d.name("gone").await.unwrap(), None);
    }
}
