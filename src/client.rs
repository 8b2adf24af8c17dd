use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::attachment;
use crate::config::{ClientConfig, ConfigProvider};
use crate::domain::payload::API_ROOT;
use crate::domain::request::{
    ASYNC, ATTACHMENT_URLS, IP_POOL, KEY, TEMPLATE_CONTENT, TEMPLATE_NAME,
};
use crate::domain::{Attachment, Endpoint, OutgoingPayload, SendRequest, Sender};
use crate::error::{MandrillError, MandrillResult};

const FROM_EMAIL: &str = "from_email";
const ATTACHMENTS: &str = "attachments";

/// Sends messages through the Mandrill transactional API.
///
/// Cloning is cheap: clones share the HTTP connection pool and the bound
/// configuration.
#[derive(Clone, Debug)]
pub struct MandrillClient {
    http_client: Client,
    api_root: String,
    config: Option<Arc<ClientConfig>>,
}

impl Default for MandrillClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MandrillClient {
    /// A client with no host configuration bound yet.
    ///
    /// Every send then has to carry its own `key` and `from_email`.
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
            api_root: API_ROOT.to_owned(),
            config: None,
        }
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config: Some(Arc::new(config)),
            ..Self::new()
        }
    }

    pub fn from_host(host: &impl ConfigProvider) -> MandrillResult<Self> {
        let mut client = Self::new();
        client.init_app(host)?;
        Ok(client)
    }

    /// Binds the API key and default sender from the host configuration.
    pub fn init_app(&mut self, host: &impl ConfigProvider) -> MandrillResult<()> {
        self.config = Some(Arc::new(ClientConfig::bind(host)?));
        Ok(())
    }

    pub fn config(&self) -> Option<&ClientConfig> {
        self.config.as_deref()
    }

    /// Bounds every request, attachment downloads included. Requests never
    /// time out unless this is set.
    pub fn with_timeout(mut self, timeout: Duration) -> MandrillResult<Self> {
        self.http_client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Points the client at another deployment of the API, such as a local stub.
    pub fn with_api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = api_root.into();
        self
    }

    pub fn messages_endpoint(&self) -> String {
        Endpoint::Messages.url(&self.api_root)
    }

    pub fn templates_endpoint(&self) -> String {
        Endpoint::Templates.url(&self.api_root)
    }

    /// Builds the payload for `request` and posts it to the matching endpoint.
    #[tracing::instrument(
        name = "Send Mandrill message",
        skip(self, request),
        fields(endpoint = tracing::field::Empty)
    )]
    pub async fn send(&self, request: SendRequest) -> MandrillResult<SendResponse> {
        let (payload, endpoint) = self.build_payload(request).await?;
        tracing::Span::current().record("endpoint", &tracing::field::debug(endpoint));

        self.dispatch(&payload, endpoint).await
    }

    /// Splits the control keys off `request` and assembles the request body.
    ///
    /// The API key is checked before anything else, so a missing key never
    /// costs an attachment download. The sender is checked last.
    pub async fn build_payload(
        &self,
        mut request: SendRequest,
    ) -> MandrillResult<(OutgoingPayload, Endpoint)> {
        let send_async = request.take_bool(ASYNC)?.unwrap_or(false);
        let ip_pool = request.take_string(IP_POOL)?.unwrap_or_default();
        let key = match request.take_string(KEY)? {
            Some(key) => Some(key),
            None => self.configured_key(),
        }
        .filter(|key| !key.is_empty())
        .map(Secret::new)
        .ok_or(MandrillError::MissingCredential)?;

        let template_name = request
            .take_string(TEMPLATE_NAME)?
            .filter(|name| !name.is_empty());
        let template_content = request.take_array(TEMPLATE_CONTENT)?;
        let attachment_urls = request
            .take_string_array(ATTACHMENT_URLS)?
            .unwrap_or_default();

        let (endpoint, template_content) = match template_name {
            Some(_) => (Endpoint::Templates, Some(template_content.unwrap_or_default())),
            None => (Endpoint::Messages, None),
        };
        tracing::debug!(?endpoint, "selected endpoint");

        let mut message = request.into_message();
        let caller_sender = has_sender(&message)?;

        if !attachment_urls.is_empty() {
            let resolved = attachment::resolve_all(&self.http_client, &attachment_urls).await?;
            append_attachments(&mut message, resolved);
        }

        if !caller_sender {
            let sender = self.default_sender().ok_or(MandrillError::MissingSender)?;
            message.insert(FROM_EMAIL.to_owned(), Value::String(sender.to_string()));
        }

        let payload = OutgoingPayload {
            send_async,
            ip_pool,
            key,
            template_name,
            template_content,
            message,
        };

        Ok((payload, endpoint))
    }

    async fn dispatch(
        &self,
        payload: &OutgoingPayload,
        endpoint: Endpoint,
    ) -> MandrillResult<SendResponse> {
        let url = endpoint.url(&self.api_root);
        let response = self.http_client.post(&url).json(payload).send().await?;

        let status = response.status().as_u16();

        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, %url, "Mandrill API call failed");
            return Err(MandrillError::Remote { status, body });
        }

        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text));
        Ok(SendResponse { status, body })
    }

    fn configured_key(&self) -> Option<String> {
        self.config
            .as_ref()
            .and_then(|config| config.api_key.as_ref())
            .map(|key| key.expose_secret().clone())
    }

    fn default_sender(&self) -> Option<&Sender> {
        self.config
            .as_ref()
            .and_then(|config| config.default_from.as_ref())
    }
}

/// A null or blank `from_email` counts as absent; any other non-string is refused.
fn has_sender(message: &Map<String, Value>) -> MandrillResult<bool> {
    match message.get(FROM_EMAIL) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::String(from)) => Ok(Sender::try_from(from.as_str()).is_ok()),
        Some(_) => Err(MandrillError::InvalidControlKey {
            key: FROM_EMAIL.to_owned(),
            expected: "a string",
        }),
    }
}

fn append_attachments(message: &mut Map<String, Value>, resolved: Vec<Attachment>) {
    let resolved = resolved.into_iter().map(Value::from);
    match message.get_mut(ATTACHMENTS) {
        Some(Value::Array(existing)) => existing.extend(resolved),
        _ => {
            message.insert(ATTACHMENTS.to_owned(), Value::Array(resolved.collect()));
        }
    }
}

/// What Mandrill answered to a successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct SendResponse {
    pub status: u16,
    /// The decoded JSON body, or the raw text as a JSON string if it was not JSON.
    pub body: Value,
}

/// Per-recipient outcome reported by the send methods.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Delivery {
    pub email: String,
    pub status: String,
    #[serde(default)]
    pub reject_reason: Option<String>,
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
}

impl Delivery {
    pub fn is_rejected(&self) -> bool {
        matches!(self.status.as_str(), "rejected" | "invalid")
    }
}

impl SendResponse {
    pub fn deliveries(&self) -> Result<Vec<Delivery>, serde_json::Error> {
        Vec::<Delivery>::deserialize(&self.body)
    }

    /// Recipients Mandrill refused even though the call itself succeeded.
    pub fn rejected(&self) -> Result<Vec<Delivery>, serde_json::Error> {
        Ok(self
            .deliveries()?
            .into_iter()
            .filter(Delivery::is_rejected)
            .collect())
    }
}
