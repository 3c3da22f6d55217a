use super::MailMessage;
use crate::config::MailSettings;
use async_trait::async_trait;
use lettre::{
    transport::smtp::authentication::Credentials, AsyncSmtpTransport, AsyncTransport,
    Tokio1Executor,
};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("No mail endpoints configured")]
    NoEndpoints,
}

impl MailError {
    /// Whether another endpoint might succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_transient() || err.is_permanent() || err.is_response() {
            Self::Rejected(err.to_string())
        } else if err.is_client() {
            Self::InvalidMessage(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    None,
    StartTls,
    Tls,
}

/// One way of reaching the mail host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MailEndpoint {
    pub port: u16,
    pub security: SmtpSecurity,
}

impl MailEndpoint {
    pub fn default_list() -> Vec<MailEndpoint> {
        vec![
            MailEndpoint {
                port: 587,
                security: SmtpSecurity::StartTls,
            },
            MailEndpoint {
                port: 465,
                security: SmtpSecurity::Tls,
            },
        ]
    }
}

impl fmt::Display for MailEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let security = match self.security {
            SmtpSecurity::None => "plain",
            SmtpSecurity::StartTls => "starttls",
            SmtpSecurity::Tls => "tls",
        };
        write!(f, "{}/{}", self.port, security)
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, endpoint: &MailEndpoint, message: &MailMessage) -> Result<(), MailError>;
}

/// SMTP delivery through lettre, one transport per endpoint.
pub struct LettreTransport {
    default_from: String,
    transports: Vec<(MailEndpoint, AsyncSmtpTransport<Tokio1Executor>)>,
}

impl LettreTransport {
    pub fn new(settings: &MailSettings) -> Result<Self, MailError> {
        let mut transports = Vec::with_capacity(settings.endpoints.len());
        for endpoint in &settings.endpoints {
            let mut builder = match endpoint.security {
                SmtpSecurity::None => {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
                }
                SmtpSecurity::StartTls => {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
                }
                SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?,
            };

            builder = builder
                .port(endpoint.port)
                .timeout(Some(settings.timeout));

            if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
                builder =
                    builder.credentials(Credentials::new(username.clone(), password.clone()));
            }

            transports.push((*endpoint, builder.build()));
        }

        info!(
            "SMTP transport initialized for {} via {}",
            settings.host,
            settings
                .endpoints
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            default_from: settings.from.clone(),
            transports,
        })
    }
}

#[async_trait]
impl MailTransport for LettreTransport {
    async fn send(&self, endpoint: &MailEndpoint, message: &MailMessage) -> Result<(), MailError> {
        let transport = self
            .transports
            .iter()
            .find(|(e, _)| e == endpoint)
            .map(|(_, t)| t)
            .ok_or(MailError::NoEndpoints)?;

        let email = message.to_lettre(&self.default_from)?;
        debug!("Sending mail to {} via {}", message.to, endpoint);
        transport.send(email).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_failures_are_retryable() {
        assert!(MailError::Connection("refused".to_string()).is_retryable());
        assert!(MailError::Timeout("read".to_string()).is_retryable());
        assert!(!MailError::Rejected("550".to_string()).is_retryable());
        assert!(!MailError::InvalidMessage("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_endpoint_list_deserializes() {
        #[derive(Deserialize)]
        struct Wrapper {
            endpoints: Vec<MailEndpoint>,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
            endpoints = [
                { port = 587, security = "starttls" },
                { port = 25, security = "none" },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(parsed.endpoints[0], MailEndpoint::default_list()[0]);
        assert_eq!(parsed.endpoints[1].security, SmtpSecurity::None);
        assert_eq!(parsed.endpoints[1].to_string(), "25/plain");
    }
}
