use serde::{Deserialize, Serialize};

/// A named event with a JSON body, relayed to every connected client on
/// every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Event name, e.g. `"on_upload_success"`.
    pub event: String,
    /// Event-specific data.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Packet {
    /// Create a packet with an empty object as its body.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: serde_json::Value::Object(Default::default()),
        }
    }

    /// Set the JSON body.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
