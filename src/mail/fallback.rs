use super::{MailEndpoint, MailError, MailMessage, MailTransport};
use crate::server::metrics;
use tracing::warn;

#[derive(Debug)]
pub struct SendReport {
    pub attempts: usize,
    /// The endpoint that accepted the message, or the last failure.
    pub result: Result<MailEndpoint, MailError>,
}

/// Tries endpoints in order, moving on only after connection or timeout
/// failures. Any other failure ends the send.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    endpoints: Vec<MailEndpoint>,
}

impl FallbackPolicy {
    pub fn new(endpoints: Vec<MailEndpoint>) -> Self {
        Self { endpoints }
    }

    pub fn endpoints(&self) -> &[MailEndpoint] {
        &self.endpoints
    }

    pub async fn send(&self, transport: &dyn MailTransport, message: &MailMessage) -> SendReport {
        let mut attempts = 0;
        let mut last_error = MailError::NoEndpoints;

        for endpoint in &self.endpoints {
            attempts += 1;
            let endpoint_label = endpoint.to_string();
            match transport.send(endpoint, message).await {
                Ok(()) => {
                    metrics::record_mail_attempt(&endpoint_label, true);
                    return SendReport {
                        attempts,
                        result: Ok(*endpoint),
                    };
                }
                Err(err) => {
                    metrics::record_mail_attempt(&endpoint_label, false);
                    if !err.is_retryable() {
                        return SendReport {
                            attempts,
                            result: Err(err),
                        };
                    }
                    warn!("Mail to {} failed on {}: {}", message.to, endpoint, err);
                    last_error = err;
                }
            }
        }

        SendReport {
            attempts,
            result: Err(last_error),
        }
    }
}
