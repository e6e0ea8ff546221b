//! Generic JSON cursor endpoint
//!
//! Adapts any listing endpoint of the shape
//! `GET <template with {target}>?<cursor_param>=<cursor>` whose response
//! carries an item array, a continuation cursor and a has-more flag at known
//! JSON pointers.

use super::{HttpTransport, Page, PageSource};
use crate::error::{CrawlError, CrawlResult};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Where a [`JsonCursorSource`] finds things in the endpoint's responses
#[derive(Debug, Clone, PartialEq)]
pub struct JsonSourceConfig {
    /// URL with a `{target}` placeholder
    pub url_template: String,
    /// Query parameter carrying the cursor; omitted on the first page
    pub cursor_param: String,
    /// JSON pointer to the item array
    pub items_pointer: String,
    /// JSON pointer to the next cursor (string or number)
    pub cursor_pointer: String,
    /// JSON pointer to the has-more flag; when unset, a present cursor means
    /// more pages follow
    pub has_more_pointer: Option<String>,
    /// JSON pointer to a success flag (`true` or a zero status code)
    pub success_pointer: Option<String>,
    /// JSON pointer to the endpoint's message
    pub message_pointer: Option<String>,
    /// Extra query parameters sent with every request
    pub extra_query: Vec<(String, String)>,
}

impl JsonSourceConfig {
    /// Defaults for `url_template`: `cursor` parameter, top-level `items`,
    /// `cursor` and `has_more` fields
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            cursor_param: "cursor".to_string(),
            items_pointer: "/items".to_string(),
            cursor_pointer: "/cursor".to_string(),
            has_more_pointer: Some("/has_more".to_string()),
            success_pointer: None,
            message_pointer: None,
            extra_query: Vec::new(),
        }
    }

    /// Reject templates without a target placeholder and malformed pointers
    pub fn validate(&self) -> CrawlResult<()> {
        if !self.url_template.contains("{target}") {
            return Err(CrawlError::Configuration(format!(
                "URL template must contain {{target}}: {}",
                self.url_template
            )));
        }
        if self.cursor_param.is_empty() {
            return Err(CrawlError::Configuration("cursor parameter is empty".to_string()));
        }
        let pointers = [Some(&self.items_pointer), Some(&self.cursor_pointer)]
            .into_iter()
            .chain([
                self.has_more_pointer.as_ref(),
                self.success_pointer.as_ref(),
                self.message_pointer.as_ref(),
            ])
            .flatten();
        for pointer in pointers {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(CrawlError::Configuration(format!(
                    "JSON pointer must be empty or start with '/': {pointer}"
                )));
            }
        }
        Ok(())
    }

    /// Fill the template with `target` percent-encoded as one path segment
    ///
    /// # Errors
    /// [`CrawlError::Configuration`] for an empty target or a dot segment,
    /// which cannot name a resource of its own
    pub fn url_for(&self, target: &str) -> CrawlResult<String> {
        if target.is_empty() || target == "." || target == ".." {
            return Err(CrawlError::Configuration(format!(
                "target {target:?} cannot be placed in a URL"
            )));
        }
        Ok(self
            .url_template
            .replace("{target}", &urlencoding::encode(target)))
    }
}

/// [`PageSource`] over a JSON listing endpoint; items are raw JSON values
#[derive(Debug, Clone)]
pub struct JsonCursorSource {
    transport: HttpTransport,
    config: JsonSourceConfig,
}

impl JsonCursorSource {
    /// Create a source, validating `config`
    pub fn new(transport: HttpTransport, config: JsonSourceConfig) -> CrawlResult<Self> {
        config.validate()?;
        Ok(Self { transport, config })
    }

    /// Active configuration
    pub fn config(&self) -> &JsonSourceConfig {
        &self.config
    }

    /// Interpret one decoded response
    pub fn parse_page(&self, body: &Value) -> CrawlResult<Page<Value, String>> {
        if let Some(pointer) = &self.config.success_pointer {
            let ok = body.pointer(pointer).and_then(as_success).unwrap_or(false);
            if !ok {
                let message = self
                    .config
                    .message_pointer
                    .as_ref()
                    .and_then(|p| body.pointer(p))
                    .map(value_text)
                    .unwrap_or_else(|| "endpoint reported failure".to_string());
                return Ok(Page::failed(message));
            }
        }

        let items = match body.pointer(&self.config.items_pointer) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(CrawlError::Data(format!(
                    "{} is not an array",
                    self.config.items_pointer
                )))
            }
            None => {
                return Err(CrawlError::Data(format!(
                    "missing item array at {}",
                    self.config.items_pointer
                )))
            }
        };

        let next_cursor = body
            .pointer(&self.config.cursor_pointer)
            .filter(|v| !v.is_null())
            .map(value_text)
            .filter(|c| !c.is_empty());

        let has_more = match &self.config.has_more_pointer {
            Some(pointer) => body.pointer(pointer).and_then(as_flag).unwrap_or(false),
            None => next_cursor.is_some(),
        };

        Ok(Page {
            success: true,
            message: String::new(),
            items,
            next_cursor,
            has_more,
        })
    }
}

#[async_trait]
impl PageSource for JsonCursorSource {
    type Item = Value;
    type Cursor = String;

    async fn fetch_page(&self, target: &str, cursor: &String) -> CrawlResult<Page<Value, String>> {
        let url = self.config.url_for(target)?;
        let mut params = self.config.extra_query.clone();
        if !cursor.is_empty() {
            params.push((self.config.cursor_param.clone(), cursor.clone()));
        }

        let body: Value = self.transport.get(&url, &params).await?;
        let page = self.parse_page(&body)?;
        debug!(
            url = %url,
            items = page.items.len(),
            has_more = page.has_more,
            next_cursor = ?page.next_cursor,
            "Parsed page"
        );
        Ok(page)
    }
}

/// `true`/`false`, or a number where non-zero means set
fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

/// `true`/`false`, or a status code where zero means success
fn as_success(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(n) => n.as_i64().map(|n| n == 0),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
