//! Notion publisher
//!
//! Pages are created in one database. On connect the database schema is read
//! once to find its title property and (optionally) its first date property.
//! Notion accepts at most 100 children per request, so the first 100 blocks
//! ride on page creation and the rest are appended in batches.

use std::time::Duration;

use serde_json::{json, Value};

use crate::error::RecapError;
use crate::publisher::{PageRequest, PublishedPage, Publisher};
use crate::render::{Block, TextSpan};
use crate::util::truncate_chars;

const NOTION_API_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Children per create/append request.
pub const MAX_BLOCKS_PER_REQUEST: usize = 100;

/// Notion rejects rich text items longer than this.
const MAX_RICH_TEXT_CHARS: usize = 2_000;

/// Names of the properties pages are written into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseProperties {
    pub title: String,
    pub date: Option<String>,
}

/// Pick the title property and the first date property from a database
/// object as returned by `GET /databases/{id}`. "First" follows the order
/// the API listed them in.
pub fn resolve_properties(database: &Value) -> Result<DatabaseProperties, RecapError> {
    let properties = database
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| RecapError::Publisher("database has no properties".to_string()))?;

    let first_of_type = |kind: &str| {
        properties
            .iter()
            .find(|(_, prop)| prop.get("type").and_then(Value::as_str) == Some(kind))
            .map(|(name, _)| name.clone())
    };

    let title = first_of_type("title")
        .ok_or_else(|| RecapError::Publisher("database has no title property".to_string()))?;
    Ok(DatabaseProperties {
        title,
        date: first_of_type("date"),
    })
}

fn rich_text(spans: &[TextSpan]) -> Value {
    let mut items = Vec::new();
    for span in spans {
        let mut rest = span.content.as_str();
        loop {
            let piece = truncate_chars(rest, MAX_RICH_TEXT_CHARS);
            let mut item = json!({ "type": "text", "text": { "content": piece } });
            if span.bold {
                item["annotations"] = json!({ "bold": true });
            }
            items.push(item);
            rest = &rest[piece.len()..];
            if rest.is_empty() {
                break;
            }
        }
    }
    Value::Array(items)
}

/// Notion block JSON for one rendered block.
pub fn block_json(block: &Block) -> Value {
    match block {
        Block::Heading { level, spans } => {
            let kind = format!("heading_{}", (*level).clamp(1, 3));
            let mut block = json!({ "object": "block", "type": kind });
            block[kind.as_str()] = json!({ "rich_text": rich_text(spans) });
            block
        }
        Block::Paragraph { spans } => json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": { "rich_text": rich_text(spans) },
        }),
        Block::Spacer => json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": { "rich_text": [{ "type": "text", "text": { "content": "" } }] },
        }),
    }
}

/// Body of `POST /pages` carrying the first batch of children.
pub fn page_payload(
    database_id: &str,
    properties: &DatabaseProperties,
    page: &PageRequest,
    children: &[Value],
) -> Value {
    let mut props = serde_json::Map::new();
    props.insert(
        properties.title.clone(),
        json!({ "title": [{ "text": { "content": page.title } }] }),
    );
    if let (Some(name), Some(date)) = (&properties.date, &page.date) {
        props.insert(name.clone(), json!({ "date": date }));
    }
    json!({
        "parent": { "database_id": database_id },
        "properties": props,
        "children": children,
    })
}

pub struct NotionPublisher {
    client: reqwest::blocking::Client,
    token: String,
    database_id: String,
    properties: DatabaseProperties,
}

impl NotionPublisher {
    /// Connect to a database and resolve its properties.
    pub fn connect(token: &str, database_id: &str) -> Result<Self, RecapError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let mut publisher = Self {
            client,
            token: token.to_string(),
            database_id: database_id.to_string(),
            properties: DatabaseProperties {
                title: String::new(),
                date: None,
            },
        };
        let database = publisher.send(
            publisher
                .client
                .get(format!("{}/databases/{}", NOTION_API_URL, database_id)),
        )?;
        publisher.properties = resolve_properties(&database)?;
        log::info!(
            "Notion database resolved: title '{}', date {}",
            publisher.properties.title,
            publisher.properties.date.as_deref().unwrap_or("(none)")
        );
        Ok(publisher)
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<Value, RecapError> {
        let resp = request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().unwrap_or_default();
            return Err(RecapError::Api {
                status,
                message: text,
            });
        }
        Ok(resp.json()?)
    }
}

impl Publisher for NotionPublisher {
    fn publish(&self, page: &PageRequest) -> Result<PublishedPage, RecapError> {
        let children: Vec<Value> = page.blocks.iter().map(block_json).collect();
        let mut batches = children.chunks(MAX_BLOCKS_PER_REQUEST);
        let first = batches.next().unwrap_or(&[]);

        let payload = page_payload(&self.database_id, &self.properties, page, first);
        let created = self.send(
            self.client
                .post(format!("{}/pages", NOTION_API_URL))
                .json(&payload),
        )?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| RecapError::Publisher("created page has no id".to_string()))?
            .to_string();
        let url = created.get("url").and_then(Value::as_str).map(str::to_string);

        for batch in batches {
            self.send(
                self.client
                    .patch(format!("{}/blocks/{}/children", NOTION_API_URL, id))
                    .json(&json!({ "children": batch })),
            )?;
        }
        log::debug!("Created '{}' with {} block(s)", page.title, children.len());

        Ok(PublishedPage { id, url })
    }
}
