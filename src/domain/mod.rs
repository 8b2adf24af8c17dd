pub mod payload;
pub mod request;
pub mod sender;

pub use payload::{Attachment, Endpoint, OutgoingPayload};
pub use request::SendRequest;
pub use sender::Sender;
