use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters submitted when creating a scan. Only `url` is interpreted
/// locally; everything else goes to the server untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScanOptions {
    pub fn for_url(url: impl Into<String>) -> Self {
        ScanOptions { url: Some(url.into()), extra: Map::new() }
    }

    /// Sets a scanner option. A string `url` key updates the target instead
    /// of landing in `extra`, so it is never serialized twice.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        if key == "url" {
            if let Value::String(u) = value {
                self.url = Some(u);
                return self;
            }
        }
        self.extra.insert(key, value);
        self
    }
}
