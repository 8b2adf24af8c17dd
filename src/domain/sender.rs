use derive_more::Display;

/// A non-empty `from_email` address.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display(fmt = "{}", _0)]
pub struct Sender(String);

impl TryFrom<String> for Sender {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err("sender is empty".into());
        }

        Ok(Self(value))
    }
}

impl TryFrom<&str> for Sender {
    type Error = String;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}

impl AsRef<str> for Sender {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
