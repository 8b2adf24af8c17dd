use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

pub const API_ROOT: &str = "https://mandrillapp.com/api/1.0";
pub const MESSAGES_ENDPOINT: &str = "https://mandrillapp.com/api/1.0/messages/send.json";
pub const TEMPLATES_ENDPOINT: &str = "https://mandrillapp.com/api/1.0/messages/send-template.json";

/// Which Mandrill method a payload is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Messages,
    Templates,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::Messages => "/messages/send.json",
            Self::Templates => "/messages/send-template.json",
        }
    }

    /// Full URL of this endpoint below `api_root`.
    pub fn url(self, api_root: &str) -> String {
        format!("{}{}", api_root.trim_end_matches('/'), self.path())
    }
}

/// A file inlined into the message as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub content: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl From<Attachment> for Value {
    fn from(attachment: Attachment) -> Self {
        serde_json::json!({
            "content": attachment.content,
            "name": attachment.name,
            "type": attachment.mime_type,
        })
    }
}

/// The JSON body posted to Mandrill.
#[derive(Debug, Serialize)]
pub struct OutgoingPayload {
    #[serde(rename = "async")]
    pub send_async: bool,
    pub ip_pool: String,
    #[serde(serialize_with = "expose_key")]
    pub key: Secret<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_content: Option<Vec<Value>>,
    pub message: Map<String, Value>,
}

fn expose_key<S: Serializer>(key: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(key.expose_secret())
}
