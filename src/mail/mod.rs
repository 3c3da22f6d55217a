//! Outbound mail with endpoint fallback.

mod fallback;
mod handler;
mod message;
mod transport;

pub use fallback::{FallbackPolicy, SendReport};
pub use handler::EmailJobHandler;
pub use message::MailMessage;
pub use transport::{LettreTransport, MailEndpoint, MailError, MailTransport, SmtpSecurity};
