use serde::Deserialize;
use serde_json::{Map, Value};

pub type Row = Map<String, Value>;

/// Error body returned by the hosted REST endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl ApiError {
    pub fn describe(&self) -> String {
        let mut text = match &self.code {
            Some(code) => format!("{} ({})", self.message, code),
            None => self.message.clone(),
        };
        if let Some(details) = &self.details {
            text.push_str(": ");
            text.push_str(details);
        }
        if let Some(hint) = &self.hint {
            text.push_str(" hint: ");
            text.push_str(hint);
        }
        text
    }
}

/// Total from a `Content-Range` header such as `0-0/42` or `*/0`.
pub fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}
