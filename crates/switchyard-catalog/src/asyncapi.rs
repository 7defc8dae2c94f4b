//! AsyncAPI 2.0.0 document builder.
//!
//! Client messages are documented under each channel's `publish` operation
//! (what a client may send) and server messages under `subscribe` (what a
//! client receives). Message and payload schemas carrying a `$id` are moved
//! to `components` and replaced by a `$ref`.

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use switchyard_router::{ChannelDescription, MessageKind, MessageSchema, Router};
use tracing::debug;

/// AsyncAPI version emitted.
pub const ASYNCAPI_VERSION: &str = "2.0.0";

/// Document metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    /// API title.
    pub title: String,
    /// API version (not the AsyncAPI version).
    pub version: String,
    /// Short description, CommonMark allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// URL of the terms of service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,
    /// Contact for the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    /// License of the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
}

impl Info {
    /// Metadata with a title and version.
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Contact information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact person or organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Contact URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Contact email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// License information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct License {
    /// License name, e.g. `MIT`.
    pub name: String,
    /// URL of the license text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A server the API is reachable at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /// Server URL.
    pub url: String,
    /// Protocol name (`ws` or `wss`).
    pub protocol: String,
    /// Protocol version, if relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Server {
    /// A WebSocket server at `url`.
    pub fn ws(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocol: "ws".to_string(),
            protocol_version: None,
            description: None,
        }
    }
}

/// Top-level document parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogParams {
    /// Document metadata.
    pub info: Info,
    /// Servers by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub servers: BTreeMap<String, Server>,
    /// Content type of messages without their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_content_type: Option<String>,
}

impl CatalogParams {
    /// Parameters with the given metadata and JSON as content type.
    pub fn new(info: Info) -> Self {
        Self {
            info,
            servers: BTreeMap::new(),
            default_content_type: Some("application/json".to_string()),
        }
    }

    /// Add a named server.
    pub fn server(mut self, name: impl Into<String>, server: Server) -> Self {
        self.servers.insert(name.into(), server);
        self
    }
}

/// Builds an AsyncAPI document channel by channel.
#[derive(Debug, Clone)]
pub struct AsyncApiBuilder {
    params: CatalogParams,
    channels: Map<String, Value>,
    messages: Map<String, Value>,
    schemas: Map<String, Value>,
}

impl AsyncApiBuilder {
    /// Create an empty document.
    pub fn new(params: CatalogParams) -> Self {
        Self {
            params,
            channels: Map::new(),
            messages: Map::new(),
            schemas: Map::new(),
        }
    }

    /// Document every channel of a router, root first.
    pub fn from_router(router: &Router, params: CatalogParams) -> Self {
        let mut builder = Self::new(params);
        for description in router.describe() {
            builder.add_description(&description);
        }
        builder
    }

    /// Document one channel from its description. Declarations without a
    /// schema are skipped.
    pub fn add_description(&mut self, description: &ChannelDescription) {
        let mut publish = Vec::new();
        let mut subscribe = Vec::new();
        for message in &description.messages {
            let Some(schema) = &message.schema else {
                continue;
            };
            match message.kind {
                MessageKind::Client => publish.push(schema.clone()),
                MessageKind::Server => subscribe.push(schema.clone()),
            }
        }
        self.add_channel(&description.path, &publish, &subscribe, &description.parameters);
    }

    /// Document a channel.
    ///
    /// `publish` lists the messages clients send, `subscribe` the messages
    /// the server sends, and `parameters` the `{param}` names in `path`.
    pub fn add_channel(
        &mut self,
        path: &str,
        publish: &[MessageSchema],
        subscribe: &[MessageSchema],
        parameters: &[String],
    ) {
        let mut channel = Map::new();

        if !parameters.is_empty() {
            let parameters: Map<String, Value> = parameters
                .iter()
                .map(|name| {
                    (
                        name.clone(),
                        json!({
                            "description": format!("Path parameter `{name}`"),
                            "schema": {"type": "string"}
                        }),
                    )
                })
                .collect();
            channel.insert("parameters".into(), Value::Object(parameters));
        }

        if !publish.is_empty() {
            channel.insert(
                "publish".into(),
                json!({
                    "description": "Send messages to the server",
                    "operationId": "sendMessage",
                    "message": self.operation_message(publish),
                }),
            );
        }

        if !subscribe.is_empty() {
            channel.insert(
                "subscribe".into(),
                json!({
                    "description": "Messages that you receive from the server",
                    "operationId": "onMessage",
                    "message": self.operation_message(subscribe),
                }),
            );
        }

        debug!(channel = %path, publish = publish.len(), subscribe = subscribe.len(), "Channel documented");
        self.channels.insert(path.to_string(), Value::Object(channel));
    }

    /// Produce the document.
    pub fn generate(&self) -> Result<Value, CatalogError> {
        if self.params.info.title.trim().is_empty() {
            return Err(CatalogError::InvalidInfo("title is empty".into()));
        }
        if self.params.info.version.trim().is_empty() {
            return Err(CatalogError::InvalidInfo("version is empty".into()));
        }
        if let Some((name, _)) = self
            .params
            .servers
            .iter()
            .find(|(_, server)| server.url.trim().is_empty())
        {
            return Err(CatalogError::InvalidInfo(format!("server '{name}' has no url")));
        }

        let mut document = Map::new();
        document.insert("asyncapi".into(), Value::String(ASYNCAPI_VERSION.into()));
        if let Value::Object(params) = serde_json::to_value(&self.params)? {
            document.extend(params);
        }
        document.insert("channels".into(), Value::Object(self.channels.clone()));
        let mut components = Map::new();
        components.insert("messages".into(), Value::Object(self.messages.clone()));
        components.insert("schemas".into(), Value::Object(self.schemas.clone()));
        document.insert("components".into(), Value::Object(components));
        Ok(Value::Object(document))
    }

    /// Produce the document as a JSON string.
    pub fn to_json_string(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string(&self.generate()?)?)
    }

    fn operation_message(&mut self, messages: &[MessageSchema]) -> Value {
        match messages {
            [single] => self.message_ref(single),
            many => json!({
                "oneOf": many.iter().map(|m| self.message_ref(m)).collect::<Vec<_>>()
            }),
        }
    }

    fn message_ref(&mut self, message: &MessageSchema) -> Value {
        let mut data = match serde_json::to_value(message) {
            Ok(Value::Object(data)) => data,
            _ => Map::new(),
        };
        data.remove("$id");
        data.insert("payload".into(), self.schema_ref(&message.payload));

        match &message.id {
            Some(id) => {
                self.messages.insert(id.clone(), Value::Object(data));
                json!({"$ref": format!("#/components/messages/{id}")})
            }
            None => Value::Object(data),
        }
    }

    fn schema_ref(&mut self, schema: &Value) -> Value {
        let Value::Object(source) = schema else {
            return schema.clone();
        };
        let mut data = source.clone();
        let id = data.remove("$id");

        match source.get("type").and_then(Value::as_str) {
            Some("object") => {
                if let Some(Value::Object(properties)) = source.get("properties") {
                    let properties: Map<String, Value> = properties
                        .iter()
                        .map(|(key, value)| (key.clone(), self.schema_ref(value)))
                        .collect();
                    data.insert("properties".into(), Value::Object(properties));
                }
            }
            Some("array") => {
                if let Some(items) = source.get("items") {
                    data.insert("items".into(), self.schema_ref(items));
                }
            }
            _ => {}
        }

        match id {
            Some(Value::String(id)) => {
                self.schemas.insert(id.clone(), Value::Object(data));
                json!({"$ref": format!("#/components/schemas/{id}")})
            }
            _ => Value::Object(data),
        }
    }
}
