use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor, message::header::ContentType,
    transport::smtp::authentication::Credentials,
};

use crate::config::SmtpConfig;

/// MailError
///
/// Failures while assembling or delivering a confirmation message.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("email build error: {0}")]
    Build(String),

    /// Returned by `MockMailer` when failure is simulated.
    #[error("mail delivery unavailable: {0}")]
    Unavailable(String),
}

const CONFIRMATION_SUBJECT: &str = "YaMDb confirmation code";

fn confirmation_body(username: &str, code: &str) -> String {
    format!(
        "Hello, {username}!\n\n\
         Your confirmation code is: {code}\n\n\
         Exchange it for an access token at POST /api/v1/auth/token."
    )
}

// 1. Mailer Contract
/// Mailer
///
/// Delivers the one-time confirmation code issued at signup. Handlers only see
/// this trait; `SmtpMailer` talks to a real relay and `MockMailer` keeps the
/// messages in memory.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_confirmation_code(
        &self,
        to_email: &str,
        username: &str,
        code: &str,
    ) -> Result<(), MailError>;
}

/// MailerState
///
/// The concrete type used to share the mailer across the application state.
pub type MailerState = Arc<dyn Mailer>;

// 2. SMTP Implementation
/// SmtpMailer
///
/// Sends plain-text mail through a STARTTLS relay. The transport is built once
/// and reused; lettre pools the underlying connections.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port);

        if let (Some(user), Some(pass)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_confirmation_code(
        &self,
        to_email: &str,
        username: &str,
        code: &str,
    ) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(to_email.parse()?)
            .subject(CONFIRMATION_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(confirmation_body(username, code))
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport.send(email).await?;

        tracing::info!(to = to_email, username, "Confirmation code sent");
        Ok(())
    }
}

// 3. In-Memory Implementation
/// SentMail
///
/// A message captured by `MockMailer`.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub username: String,
    pub code: String,
}

/// MockMailer
///
/// Records every message instead of delivering it, so tests can read the codes
/// back. The history is unbounded; servers use `LogMailer` instead.
#[derive(Clone, Default)]
pub struct MockMailer {
    /// When true, every send returns `MailError::Unavailable`.
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<SentMail>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// All messages recorded so far, oldest first.
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// The most recent code mailed to `to_email`.
    pub fn last_code_for(&self, to_email: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.to == to_email)
            .map(|m| m.code)
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_confirmation_code(
        &self,
        to_email: &str,
        username: &str,
        code: &str,
    ) -> Result<(), MailError> {
        if self.should_fail {
            return Err(MailError::Unavailable("simulated failure".to_string()));
        }

        tracing::debug!(to = to_email, username, code, "Confirmation code (not delivered)");

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMail {
                to: to_email.to_string(),
                username: username.to_string(),
                code: code.to_string(),
            });
        }
        Ok(())
    }
}

// 4. Log-Only Implementation
/// LogMailer
///
/// The local fallback when no SMTP relay is configured. Writes the code to the
/// log so a developer can complete the token exchange, and keeps nothing.
#[derive(Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_confirmation_code(
        &self,
        to_email: &str,
        username: &str,
        code: &str,
    ) -> Result<(), MailError> {
        tracing::info!(to = to_email, username, code, "Confirmation code (not delivered)");
        Ok(())
    }
}
