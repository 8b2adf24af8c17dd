use serde_json::{Map, Value};

use crate::error::{MandrillError, MandrillResult};

pub const ASYNC: &str = "async";
pub const IP_POOL: &str = "ip_pool";
pub const KEY: &str = "key";
pub const TEMPLATE_NAME: &str = "template_name";
pub const TEMPLATE_CONTENT: &str = "template_content";
pub const ATTACHMENT_URLS: &str = "attachment_urls";

/// Keys that steer dispatch and never reach the `message` object.
pub const CONTROL_KEYS: [&str; 6] = [
    ASYNC,
    IP_POOL,
    KEY,
    TEMPLATE_NAME,
    TEMPLATE_CONTENT,
    ATTACHMENT_URLS,
];

/// An outgoing message as an ordered, open-ended set of named fields.
///
/// Any field Mandrill understands (`to`, `subject`, `html`, `headers`,
/// `merge_vars`, ...) can be set with [`SendRequest::field`]. The reserved
/// control keys listed in [`CONTROL_KEYS`] are pulled out when the payload
/// is built; everything else becomes the `message` object as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendRequest(Map<String, Value>);

impl SendRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Overrides the configured API key for this call only.
    pub fn key(self, key: impl Into<String>) -> Self {
        self.field(KEY, key.into())
    }

    pub fn async_send(self, enabled: bool) -> Self {
        self.field(ASYNC, enabled)
    }

    pub fn ip_pool(self, pool: impl Into<String>) -> Self {
        self.field(IP_POOL, pool.into())
    }

    /// Sends through a stored template instead of inline content.
    pub fn template(self, name: impl Into<String>, content: Vec<Value>) -> Self {
        self.field(TEMPLATE_NAME, name.into())
            .field(TEMPLATE_CONTENT, content)
    }

    /// Queues a remote file to be fetched and inlined as an attachment.
    pub fn attachment_url(mut self, url: impl Into<String>) -> Self {
        let url = Value::String(url.into());
        match self.0.get_mut(ATTACHMENT_URLS) {
            Some(Value::Array(urls)) => urls.push(url),
            _ => {
                self.0.insert(ATTACHMENT_URLS.to_owned(), Value::Array(vec![url]));
            }
        }
        self
    }

    pub(crate) fn take_bool(&mut self, key: &'static str) -> MandrillResult<Option<bool>> {
        match self.0.shift_remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(value)) => Ok(Some(value)),
            Some(_) => Err(invalid(key, "a boolean")),
        }
    }

    pub(crate) fn take_string(&mut self, key: &'static str) -> MandrillResult<Option<String>> {
        match self.0.shift_remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(_) => Err(invalid(key, "a string")),
        }
    }

    pub(crate) fn take_array(&mut self, key: &'static str) -> MandrillResult<Option<Vec<Value>>> {
        match self.0.shift_remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(values)) => Ok(Some(values)),
            Some(_) => Err(invalid(key, "an array")),
        }
    }

    pub(crate) fn take_string_array(
        &mut self,
        key: &'static str,
    ) -> MandrillResult<Option<Vec<String>>> {
        self.take_array(key)?
            .map(|values| {
                values
                    .into_iter()
                    .map(|value| match value {
                        Value::String(s) => Ok(s),
                        _ => Err(invalid(key, "an array of strings")),
                    })
                    .collect::<MandrillResult<Vec<_>>>()
            })
            .transpose()
    }

    pub(crate) fn into_message(self) -> Map<String, Value> {
        self.0
    }
}

fn invalid(key: &'static str, expected: &'static str) -> MandrillError {
    MandrillError::InvalidControlKey {
        key: key.to_owned(),
        expected,
    }
}

impl From<Map<String, Value>> for SendRequest {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for SendRequest {
    type Error = String;
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            _ => Err("a send request must be a JSON object".into()),
        }
    }
}
