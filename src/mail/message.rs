use super::MailError;
use crate::dispatch::{required_str, JobError};
use crate::queue::JobParams;
use lettre::message::{header::ContentType, Mailbox};

/// An outbound mail as carried by an Email job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub from: Option<String>,
    pub reply_to: Option<String>,
}

impl MailMessage {
    pub fn from_params(params: &JobParams) -> Result<Self, JobError> {
        let optional = |name: &str| {
            params
                .get(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Ok(Self {
            to: required_str(params, "to")?.trim().to_string(),
            subject: params.get("subject").unwrap_or_default().to_string(),
            body: params.get("body").unwrap_or_default().to_string(),
            from: optional("from"),
            reply_to: optional("reply_to"),
        })
    }

    pub fn to_params(&self) -> JobParams {
        let mut params = JobParams::new()
            .with("to", &self.to)
            .with("subject", &self.subject)
            .with("body", &self.body);
        if let Some(from) = &self.from {
            params.set("from", from);
        }
        if let Some(reply_to) = &self.reply_to {
            params.set("reply_to", reply_to);
        }
        params
    }

    /// Build the wire message. `default_from` is used when the job names no
    /// sender.
    pub fn to_lettre(&self, default_from: &str) -> Result<lettre::Message, MailError> {
        let parse = |address: &str| {
            address
                .parse::<Mailbox>()
                .map_err(|e| MailError::InvalidMessage(format!("{}: {}", address, e)))
        };

        let mut builder = lettre::Message::builder()
            .from(parse(self.from.as_deref().unwrap_or(default_from))?)
            .to(parse(&self.to)?)
            .subject(self.subject.as_str());
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(parse(reply_to)?);
        }

        builder
            .header(ContentType::TEXT_PLAIN)
            .body(self.body.clone())
            .map_err(|e| MailError::InvalidMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_params_requires_recipient() {
        let params = JobParams::new().with("subject", "hi");
        assert!(matches!(
            MailMessage::from_params(&params),
            Err(JobError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_params_round_trip() {
        let message = MailMessage {
            to: "someone@example.com".to_string(),
            subject: "Your export is ready".to_string(),
            body: "Download it from the dashboard.".to_string(),
            from: None,
            reply_to: Some("support@example.com".to_string()),
        };

        assert_eq!(MailMessage::from_params(&message.to_params()).unwrap(), message);
    }

    #[test]
    fn test_to_lettre_uses_default_sender() {
        let message = MailMessage {
            to: "someone@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
            from: None,
            reply_to: None,
        };

        let built = message.to_lettre("noreply@example.com").unwrap();
        let formatted = String::from_utf8(built.formatted()).unwrap();
        assert!(formatted.contains("From: noreply@example.com"));
        assert!(formatted.contains("To: someone@example.com"));
    }

    #[test]
    fn test_to_lettre_rejects_bad_address() {
        let message = MailMessage {
            to: "not an address".to_string(),
            subject: String::new(),
            body: String::new(),
            from: None,
            reply_to: None,
        };

        assert!(matches!(
            message.to_lettre("noreply@example.com"),
            Err(MailError::InvalidMessage(_))
        ));
    }
}
