use crate::domain::models::EntityKind;
use crate::infrastructure::error::NotionApiError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::{sleep, Duration as TokioDuration};
use url::Url;

const NOTION_API_BASE: &str = "https://api.notion.com/";
const NOTION_VERSION: &str = "2022-06-28";
const QUERY_PAGE_SIZE: u32 = 100;

pub const PROP_NAME: &str = "Name";
pub const PROP_TYPE: &str = "Type";
pub const PROP_COMPLETED: &str = "Completed";
pub const PROP_PROJECT: &str = "Project";
pub const PROP_ARCHIVED: &str = "Archived";
pub const PROP_APP_ID: &str = "App ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Title,
    RichText,
    Checkbox,
    Select { options: Vec<String> },
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaProperty {
    pub name: String,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseSchema {
    pub properties: Vec<SchemaProperty>,
}

impl DatabaseSchema {
    pub fn property(&self, name: &str) -> Option<&PropertyKind> {
        self.properties
            .iter()
            .find(|property| property.name == name)
            .map(|property| &property.kind)
    }
}

/// One remote page, flattened to the fields the sync engine reconciles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePage {
    pub page_id: String,
    pub kind: EntityKind,
    pub name: String,
    pub completed: bool,
    pub project_name: Option<String>,
    pub archived: bool,
    pub app_id: Option<String>,
    pub last_edited: DateTime<Utc>,
}

/// Field values written on create/update. Projects carry no completion
/// state and no project link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFields {
    pub kind: EntityKind,
    pub name: String,
    pub completed: bool,
    pub project_name: Option<String>,
    pub archived: bool,
    pub app_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct PageBatch {
    pub pages: Vec<RemotePage>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait NotionApi: Send + Sync {
    async fn fetch_schema(
        &self,
        access_token: &str,
        database_id: &str,
    ) -> Result<DatabaseSchema, NotionApiError>;

    /// One result page of the given kind; the caller loops cursors.
    async fn query_pages(
        &self,
        access_token: &str,
        database_id: &str,
        kind: EntityKind,
        cursor: Option<&str>,
    ) -> Result<PageBatch, NotionApiError>;

    async fn find_page_by_app_id(
        &self,
        access_token: &str,
        database_id: &str,
        kind: EntityKind,
        app_id: &str,
    ) -> Result<Option<RemotePage>, NotionApiError>;

    async fn create_page(
        &self,
        access_token: &str,
        database_id: &str,
        fields: &PageFields,
    ) -> Result<RemotePage, NotionApiError>;

    async fn update_page(
        &self,
        access_token: &str,
        page_id: &str,
        fields: &PageFields,
    ) -> Result<(), NotionApiError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestNotionClient {
    client: Client,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl Default for ReqwestNotionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestNotionClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: NOTION_API_BASE.to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, NotionApiError> {
        let mut url = Url::parse(&self.base_url).map_err(|error| {
            NotionApiError::InvalidResponse(format!("invalid notion api base url: {error}"))
        })?;
        {
            let mut parts = url.path_segments_mut().map_err(|_| {
                NotionApiError::InvalidResponse("notion api base URL cannot be a base".to_string())
            })?;
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    /// Send with bounded retries on transient failures. 429 honours a
    /// server-provided Retry-After; service errors back off linearly.
    /// Terminal statuses surface immediately.
    async fn send_with_retry(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Value, NotionApiError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            let prepared = request.try_clone().ok_or_else(|| {
                NotionApiError::InvalidResponse(format!("{context}: request not retryable"))
            })?;

            let outcome = match prepared.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|error| {
                            NotionApiError::InvalidResponse(format!(
                                "{context}: failed reading response: {error}"
                            ))
                        });
                    }
                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|value| value.to_str().ok())
                        .and_then(|value| value.parse::<u64>().ok());
                    let body = response.text().await.unwrap_or_default();
                    tracing::debug!(%status, context, body = %body, "notion request failed");
                    match status.as_u16() {
                        401 => return Err(NotionApiError::Unauthorized),
                        403 => return Err(NotionApiError::Forbidden),
                        404 => return Err(NotionApiError::NotFound(context.to_string())),
                        429 => Err((NotionApiError::RateLimited, retry_after)),
                        code if code >= 500 => Err((NotionApiError::Service(code), None)),
                        code => {
                            return Err(NotionApiError::InvalidResponse(format!(
                                "{context}: unexpected status {code}"
                            )))
                        }
                    }
                }
                Err(error) => Err((NotionApiError::Network(error.to_string()), None)),
            };

            let (error, retry_after) = match outcome {
                Ok(value) => return Ok(value),
                Err(pair) => pair,
            };
            if attempt + 1 >= max_attempts {
                return Err(error);
            }
            let delay_ms = retry_after.map(|seconds| seconds.saturating_mul(1000)).unwrap_or(
                self.retry_policy
                    .base_delay_ms
                    .saturating_mul(attempt as u64 + 1),
            );
            sleep(TokioDuration::from_millis(delay_ms)).await;
            attempt = attempt.saturating_add(1);
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: Url,
        access_token: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(access_token)
            .header("Notion-Version", NOTION_VERSION)
    }
}

fn kind_label(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Project => "Project",
        EntityKind::Task => "Task",
    }
}

fn rich_text_value(content: Option<&str>) -> Value {
    match content {
        Some(text) if !text.is_empty() => json!([{ "text": { "content": text } }]),
        _ => json!([]),
    }
}

pub(crate) fn build_properties(fields: &PageFields) -> Value {
    json!({
        PROP_NAME: { "title": [{ "text": { "content": fields.name } }] },
        PROP_TYPE: { "select": { "name": kind_label(fields.kind) } },
        PROP_COMPLETED: { "checkbox": fields.completed },
        PROP_PROJECT: { "rich_text": rich_text_value(fields.project_name.as_deref()) },
        PROP_ARCHIVED: { "checkbox": fields.archived },
        PROP_APP_ID: { "rich_text": rich_text_value(Some(fields.app_id.as_str())) },
    })
}

fn plain_text(fragments: Option<&Value>) -> String {
    let Some(items) = fragments.and_then(Value::as_array) else {
        return String::new();
    };
    items
        .iter()
        .map(|item| {
            item.get("plain_text")
                .and_then(Value::as_str)
                .or_else(|| {
                    item.get("text")
                        .and_then(|text| text.get("content"))
                        .and_then(Value::as_str)
                })
                .unwrap_or_default()
        })
        .collect()
}

fn checkbox(properties: &Value, name: &str) -> bool {
    properties
        .get(name)
        .and_then(|property| property.get("checkbox"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub(crate) fn parse_page(value: &Value, kind: EntityKind) -> Result<RemotePage, NotionApiError> {
    let page_id = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| NotionApiError::InvalidResponse("page without id".to_string()))?
        .to_string();
    let last_edited_raw = value
        .get("last_edited_time")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            NotionApiError::InvalidResponse(format!("page {page_id} without last_edited_time"))
        })?;
    let last_edited = DateTime::parse_from_rfc3339(last_edited_raw)
        .map_err(|error| {
            NotionApiError::InvalidResponse(format!(
                "page {page_id} has invalid last_edited_time: {error}"
            ))
        })?
        .with_timezone(&Utc);

    let properties = value.get("properties").cloned().unwrap_or_else(|| json!({}));
    let name = plain_text(properties.get(PROP_NAME).and_then(|p| p.get("title")));
    let project_name = {
        let text = plain_text(properties.get(PROP_PROJECT).and_then(|p| p.get("rich_text")));
        if text.trim().is_empty() { None } else { Some(text) }
    };
    let app_id = {
        let text = plain_text(properties.get(PROP_APP_ID).and_then(|p| p.get("rich_text")));
        let trimmed = text.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    };

    Ok(RemotePage {
        page_id,
        kind,
        name,
        completed: checkbox(&properties, PROP_COMPLETED),
        project_name,
        archived: checkbox(&properties, PROP_ARCHIVED),
        app_id,
        last_edited,
    })
}

fn parse_schema(value: &Value) -> Result<DatabaseSchema, NotionApiError> {
    let Some(properties) = value.get("properties").and_then(Value::as_object) else {
        return Err(NotionApiError::InvalidResponse(
            "database response without properties".to_string(),
        ));
    };
    let mut schema = DatabaseSchema::default();
    for (name, descriptor) in properties {
        let type_name = descriptor
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let kind = match type_name {
            "title" => PropertyKind::Title,
            "rich_text" => PropertyKind::RichText,
            "checkbox" => PropertyKind::Checkbox,
            "select" => {
                let options = descriptor
                    .get("select")
                    .and_then(|select| select.get("options"))
                    .and_then(Value::as_array)
                    .map(|options| {
                        options
                            .iter()
                            .filter_map(|option| {
                                option.get("name").and_then(Value::as_str).map(String::from)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                PropertyKind::Select { options }
            }
            other => PropertyKind::Other(other.to_string()),
        };
        schema.properties.push(SchemaProperty {
            name: name.clone(),
            kind,
        });
    }
    Ok(schema)
}

fn parse_batch(value: &Value, kind: EntityKind) -> Result<PageBatch, NotionApiError> {
    let results = value
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            NotionApiError::InvalidResponse("query response without results".to_string())
        })?;
    let pages = results
        .iter()
        .map(|page| parse_page(page, kind))
        .collect::<Result<Vec<_>, _>>()?;
    let next_cursor = value
        .get("next_cursor")
        .and_then(Value::as_str)
        .map(String::from);
    Ok(PageBatch { pages, next_cursor })
}

#[async_trait]
impl NotionApi for ReqwestNotionClient {
    async fn fetch_schema(
        &self,
        access_token: &str,
        database_id: &str,
    ) -> Result<DatabaseSchema, NotionApiError> {
        let url = self.endpoint(&["v1", "databases", database_id])?;
        let request = self.request(reqwest::Method::GET, url, access_token);
        let body = self.send_with_retry(request, "fetch database schema").await?;
        parse_schema(&body)
    }

    async fn query_pages(
        &self,
        access_token: &str,
        database_id: &str,
        kind: EntityKind,
        cursor: Option<&str>,
    ) -> Result<PageBatch, NotionApiError> {
        let url = self.endpoint(&["v1", "databases", database_id, "query"])?;
        let mut payload = json!({
            "page_size": QUERY_PAGE_SIZE,
            "filter": { "property": PROP_TYPE, "select": { "equals": kind_label(kind) } },
        });
        if let Some(cursor) = cursor {
            payload["start_cursor"] = json!(cursor);
        }
        let request = self
            .request(reqwest::Method::POST, url, access_token)
            .json(&payload);
        let body = self.send_with_retry(request, "query database pages").await?;
        parse_batch(&body, kind)
    }

    async fn find_page_by_app_id(
        &self,
        access_token: &str,
        database_id: &str,
        kind: EntityKind,
        app_id: &str,
    ) -> Result<Option<RemotePage>, NotionApiError> {
        let url = self.endpoint(&["v1", "databases", database_id, "query"])?;
        let payload = json!({
            "page_size": 1,
            "filter": { "and": [
                { "property": PROP_TYPE, "select": { "equals": kind_label(kind) } },
                { "property": PROP_APP_ID, "rich_text": { "equals": app_id } },
            ]},
        });
        let request = self
            .request(reqwest::Method::POST, url, access_token)
            .json(&payload);
        let body = self.send_with_retry(request, "query page by app id").await?;
        let batch = parse_batch(&body, kind)?;
        Ok(batch.pages.into_iter().next())
    }

    async fn create_page(
        &self,
        access_token: &str,
        database_id: &str,
        fields: &PageFields,
    ) -> Result<RemotePage, NotionApiError> {
        let url = self.endpoint(&["v1", "pages"])?;
        let payload = json!({
            "parent": { "database_id": database_id },
            "properties": build_properties(fields),
        });
        let request = self
            .request(reqwest::Method::POST, url, access_token)
            .json(&payload);
        let body = self.send_with_retry(request, "create page").await?;
        parse_page(&body, fields.kind)
    }

    async fn update_page(
        &self,
        access_token: &str,
        page_id: &str,
        fields: &PageFields,
    ) -> Result<(), NotionApiError> {
        let url = self.endpoint(&["v1", "pages", page_id])?;
        let payload = json!({ "properties": build_properties(fields) });
        let request = self
            .request(reqwest::Method::PATCH, url, access_token)
            .json(&payload);
        self.send_with_retry(request, "update page").await?;
        Ok(())
    }
}
