//! SMTP delivery for `send-email` actions.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use salvo_script::payload::{EmailAccount, EmailPayload};
use salvo_types::{Result, SalvoError};

/// Something that can deliver an email described by an [`EmailPayload`].
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, payload: &EmailPayload) -> Result<()>;
}

/// Delivers mail over SMTP with lettre's async transport.
#[derive(Debug, Clone, Default)]
pub struct SmtpMailer;

/// Known mail services and their SMTP relay hosts.
const SERVICES: &[(&str, &str)] = &[
    ("gmail", "smtp.gmail.com"),
    ("outlook", "smtp-mail.outlook.com"),
    ("hotmail", "smtp-mail.outlook.com"),
    ("office365", "smtp.office365.com"),
    ("yahoo", "smtp.mail.yahoo.com"),
    ("icloud", "smtp.mail.me.com"),
];

/// Resolve the SMTP host for an account: an explicit `host` wins, then a known `service`.
pub fn smtp_host(account: &EmailAccount) -> Result<String> {
    if let Some(host) = account.host.as_deref().filter(|h| !h.trim().is_empty()) {
        return Ok(host.trim().to_string());
    }
    let service = account
        .service
        .as_deref()
        .ok_or_else(|| SalvoError::capability("email", "account needs a host or a service"))?;
    SERVICES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(service.trim()))
        .map(|(_, host)| host.to_string())
        .ok_or_else(|| SalvoError::capability("email", format!("unknown mail service '{}'", service)))
}

fn mailbox(address: &str, field: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| SalvoError::capability("email", format!("invalid {} address '{}': {}", field, address, e)))
}

/// Build the message without sending it.
pub fn build_message(payload: &EmailPayload) -> Result<Message> {
    let msg = &payload.message;
    let from = msg.from.as_deref().unwrap_or(payload.account.user.as_str());
    let mut builder = Message::builder()
        .from(mailbox(from, "from")?)
        .subject(msg.subject.clone());

    let to = msg.to.addresses();
    if to.is_empty() {
        return Err(SalvoError::capability("email", "no recipients"));
    }
    for address in &to {
        builder = builder.to(mailbox(address, "to")?);
    }
    if let Some(cc) = &msg.cc {
        for address in cc.addresses() {
            builder = builder.cc(mailbox(&address, "cc")?);
        }
    }

    let text = msg.text.clone().unwrap_or_default();
    let built = match &msg.html {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(text, html.clone())),
        None => builder.singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(text),
        ),
    };
    built.map_err(|e| SalvoError::capability("email", format!("failed to build email: {}", e)))
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, payload: &EmailPayload) -> Result<()> {
        let message = build_message(payload)?;
        let host = smtp_host(&payload.account)?;
        let creds = Credentials::new(payload.account.user.clone(), payload.account.password.clone());

        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .map_err(|e| SalvoError::capability("email", format!("SMTP relay error: {}", e)))?
            .credentials(creds);
        if let Some(port) = payload.account.port {
            transport = transport.port(port);
        }

        let response = transport
            .build()
            .send(message)
            .await
            .map_err(|e| SalvoError::capability("email", format!("failed to send email: {}", e)))?;
        tracing::info!(
            host = %host,
            to = %payload.message.to.joined(),
            code = %response.code(),
            "Email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salvo_script::payload::{EmailMessage, Recipients};

    fn payload() -> EmailPayload {
        EmailPayload {
            account: EmailAccount {
                service: Some("Gmail".into()),
                user: "bot@example.com".into(),
                password: "secret".into(),
                ..Default::default()
            },
            message: EmailMessage {
                to: Recipients::Many(vec!["a@example.com".into(), "b@example.com".into()]),
                subject: "Nightly report".into(),
                text: Some("All green".into()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn host_from_service_or_explicit() {
        let p = payload();
        assert_eq!(smtp_host(&p.account).unwrap(), "smtp.gmail.com");

        let explicit = EmailAccount {
            host: Some("mail.internal".into()),
            service: Some("gmail".into()),
            ..Default::default()
        };
        assert_eq!(smtp_host(&explicit).unwrap(), "mail.internal");

        let unknown = EmailAccount {
            service: Some("pigeon".into()),
            ..Default::default()
        };
        assert!(smtp_host(&unknown).is_err());
    }

    #[test]
    fn message_has_all_recipients_and_defaults_from_to_user() {
        let message = build_message(&payload()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: bot@example.com"));
        assert!(raw.contains("a@example.com, b@example.com"));
        assert!(raw.contains("Subject: Nightly report"));
        assert!(raw.contains("All green"));
    }

    #[test]
    fn invalid_address_is_rejected() {
        let mut p = payload();
        p.message.to = Recipients::One("not an address".into());
        let err = build_message(&p).unwrap_err();
        assert!(err.to_string().contains("invalid to address"));
    }

    #[test]
    fn html_body_builds_alternative() {
        let mut p = payload();
        p.message.html = Some("<b>All green</b>".into());
        let raw = String::from_utf8(build_message(&p).unwrap().formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
    }
}
