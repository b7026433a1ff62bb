//! Request/response records exchanged with the worker.
//!
//! Requests: `{"protocolVersion":1,"id":7,"method":"analyze","params":{...}}`
//! Responses: `{"protocolVersion":1,"id":7,"ok":true,"result":{...}}` or
//! `{"protocolVersion":1,"id":7,"ok":false,"error":"..."}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version stamped on every record. Responses with another version are dropped.
pub const PROTOCOL_VERSION: u32 = 1;

/// Zero-payload health check.
pub const METHOD_PING: &str = "ping";

/// Bundled feature query, see [`FeatureRequest`].
pub const METHOD_ANALYZE: &str = "analyze";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Request<'a> {
    pub protocol_version: u32,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            id,
            method,
            params,
        }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Response {
    pub protocol_version: u32,
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ResponseError {
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("protocol version {found} does not match {PROTOCOL_VERSION}")]
    VersionMismatch { found: u32 },
}

pub(crate) fn parse_response(line: &str) -> Result<Response, ResponseError> {
    let response: Response = serde_json::from_str(line)?;
    if response.protocol_version != PROTOCOL_VERSION {
        return Err(ResponseError::VersionMismatch {
            found: response.protocol_version,
        });
    }
    Ok(response)
}

/// Features that can be bundled into one [`METHOD_ANALYZE`] round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Hover,
    CallArguments,
    Definition,
    Rename,
}

/// Parameters of an [`METHOD_ANALYZE`] request.
///
/// Offsets are byte offsets into `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRequest {
    pub file_path: String,
    pub text: String,
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_end: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    pub capabilities: Vec<Capability>,
}

impl FeatureRequest {
    pub fn new(file_path: impl Into<String>, text: impl Into<String>, offset: usize) -> Self {
        Self {
            file_path: file_path.into(),
            text: text.into(),
            offset,
            range_start: None,
            range_end: None,
            new_name: None,
            capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    pub fn with_range(mut self, start: usize, end: usize) -> Self {
        self.range_start = Some(start);
        self.range_end = Some(end);
        self
    }

    pub fn with_new_name(mut self, new_name: impl Into<String>) -> Self {
        self.new_name = Some(new_name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HoverInfo {
    pub markdown: String,
}

/// Parameter-name hint for one call argument.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallArgumentHint {
    /// Offset of the argument expression.
    pub offset: usize,
    pub name: String,
    /// Set when the hint would be redundant (e.g. the argument is a variable
    /// with the parameter's name).
    #[serde(default)]
    pub hide: bool,
}

/// Zero-based position of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionLocation {
    pub file_path: String,
    pub line: u32,
    pub character: u32,
}

/// Span to replace with the new name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameEdit {
    pub file_path: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Result of an [`METHOD_ANALYZE`] request. Unrequested or unavailable
/// features are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeatureResult {
    pub hover: Option<HoverInfo>,
    pub call_arguments: Option<Vec<CallArgumentHint>>,
    pub definition: Option<Vec<DefinitionLocation>>,
    pub rename: Option<Vec<RenameEdit>>,
}
