//! Outgoing mail.
//!
//! Account confirmation links go through an [`EmailSender`]. Without SMTP settings the
//! [`FakeEmailSender`] is used, which only logs and discards the message.

use askama::Template;
use async_trait::async_trait;
use lettre::message::{MultiPart, SinglePart, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("Failed to render template: {0}")]
    Template(#[from] askama::Error),
}

/// A rendered message ready to hand to a sender.
#[derive(Clone, Debug)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync + std::fmt::Debug {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError>;
}

/// Discards every message.
#[derive(Clone, Debug, Default)]
pub struct FakeEmailSender;

#[async_trait]
impl EmailSender for FakeEmailSender {
    #[tracing::instrument(skip(self, email), fields(to = %email.to))]
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        tracing::debug!(subject = %email.subject, "No SMTP configured, discarding email");
        Ok(())
    }
}

#[derive(Clone)]
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl std::fmt::Debug for SmtpEmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpEmailSender")
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl SmtpEmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)?
            .port(config.port)
            .credentials(creds)
            .build();
        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    #[tracing::instrument(skip(self, email), fields(to = %email.to))]
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(email.to.parse()?)
            .subject(email.subject)
            .header(header::MIME_VERSION_1_0)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(email.text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(email.html_body),
                    ),
            )?;
        self.transport.send(message).await?;
        Ok(())
    }
}

#[derive(Template)]
#[template(path = "confirm_email.html")]
pub struct ConfirmEmailTemplate {
    pub user_name: String,
    pub confirm_url: String,
}

impl ConfirmEmailTemplate {
    pub fn render_html(&self) -> Result<String, askama::Error> {
        self.render()
    }

    pub fn render_text(&self) -> String {
        format!(
            r#"Hello {},

Please confirm your account by opening the link below:

{}

The link is valid for 24 hours. If you did not create an account you can ignore this email."#,
            self.user_name, self.confirm_url
        )
    }

    pub fn into_email(self, to: &str) -> Result<OutgoingEmail, EmailError> {
        Ok(OutgoingEmail {
            to: to.to_string(),
            subject: "Confirm your email".to_string(),
            html_body: self.render_html()?,
            text_body: self.render_text(),
        })
    }
}
