use std::collections::HashMap;

use secrecy::Secret;

use crate::domain::Sender;
use crate::error::{MandrillError, MandrillResult};

pub const API_KEY_SETTING: &str = "MANDRILL_API_KEY";
pub const DEFAULT_FROM_SETTING: &str = "MANDRILL_DEFAULT_FROM";

/// Where the host application keeps its settings.
pub trait ConfigProvider {
    /// Returns `Ok(None)` when `key` is not set.
    fn lookup(&self, key: &str) -> MandrillResult<Option<String>>;
}

impl ConfigProvider for HashMap<String, String> {
    fn lookup(&self, key: &str) -> MandrillResult<Option<String>> {
        Ok(self.get(key).cloned())
    }
}

impl ConfigProvider for config::Config {
    fn lookup(&self, key: &str) -> MandrillResult<Option<String>> {
        // Some sources lowercase their keys.
        for candidate in [key.to_owned(), key.to_lowercase()] {
            match self.get_string(&candidate) {
                Ok(value) => return Ok(Some(value)),
                Err(config::ConfigError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProvider for &T {
    fn lookup(&self, key: &str) -> MandrillResult<Option<String>> {
        (**self).lookup(key)
    }
}

/// Settings read from the host when the client is initialized.
///
/// The API key is only checked when a message is sent, so a client can be
/// bound before the key is available.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub api_key: Option<Secret<String>>,
    pub default_from: Option<Sender>,
}

impl ClientConfig {
    pub fn bind(host: &impl ConfigProvider) -> MandrillResult<Self> {
        let api_key = host
            .lookup(API_KEY_SETTING)?
            .filter(|key| !key.is_empty())
            .map(Secret::new);
        let default_from = host
            .lookup(DEFAULT_FROM_SETTING)?
            .and_then(|from| Sender::try_from(from).ok());

        Ok(Self {
            api_key,
            default_from,
        })
    }
}

/// Loads a YAML settings file as a host configuration.
pub fn get_configuration(path: &str) -> Result<config::Config, MandrillError> {
    let settings = config::Config::builder()
        .add_source(config::File::new(path, config::FileFormat::Yaml))
        .build()?;

    Ok(settings)
}
