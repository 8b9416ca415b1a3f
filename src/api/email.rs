//! Mail delivery abstractions for the OTP flow.
//!
//! The OTP issuer hands a rendered [`OtpMail`] to a [`MailSender`]. The sender
//! decides how to deliver (HTTP relay, log) and returns `Ok`/`Err`; a delivery
//! error is reported to the caller while the challenge row stays behind for a
//! resend within the cooldown rules.
//!
//! The relay sender keeps a fixed list of sender accounts and picks one at
//! random per message, spreading volume across accounts. Selection strategy is
//! internal to the sender; callers only see `send`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::info;

/// A rendered OTP message ready for delivery.
#[derive(Clone, Debug)]
pub struct OtpMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Render the OTP email for a freshly issued code.
#[must_use]
pub fn otp_mail(to: &str, code: &str, valid_minutes: i64) -> OtpMail {
    let subject = "Your OTP Verification Code".to_string();
    let html = format!(
        r"<div style='font-family: Arial, sans-serif; line-height: 1.5;'>
  <h2>Hello</h2>
  <p>Your One-Time Password (OTP) for email verification is:</p>
  <h1 style='color: #4CAF50;'>{code}</h1>
  <p>This OTP is valid for {valid_minutes} minutes.</p>
  <p>If you did not request this, please ignore this email.</p>
  <br/>
  <p>Thanks,</p>
  <p>Team Findex</p>
</div>"
    );
    OtpMail {
        to: to.to_string(),
        subject,
        html,
    }
}

/// Mail delivery abstraction used by the OTP issuer.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Deliver a message or return an error so the caller can report failure.
    async fn send(&self, mail: &OtpMail) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, mail: &OtpMail) -> Result<()> {
        info!(
            to = %mail.to,
            subject = %mail.subject,
            "mail send stub"
        );
        Ok(())
    }
}

/// One sender identity on the relay.
#[derive(Clone)]
pub struct MailAccount {
    pub user: String,
    pub pass: SecretString,
}

/// Parse `user:pass[,user:pass...]` from the CLI/env into accounts.
pub fn parse_mail_accounts(raw: &str) -> Result<Vec<MailAccount>> {
    let mut accounts = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (user, pass) = entry
            .split_once(':')
            .ok_or_else(|| anyhow!("mail account must be user:pass, got {entry:?}"))?;
        if user.is_empty() || pass.is_empty() {
            return Err(anyhow!("mail account must be user:pass, got {entry:?}"));
        }
        accounts.push(MailAccount {
            user: user.to_string(),
            pass: SecretString::from(pass.to_string()),
        });
    }
    if accounts.is_empty() {
        return Err(anyhow!("no mail accounts configured"));
    }
    Ok(accounts)
}

/// Sends mail through an HTTP relay, rotating randomly over a fixed account pool.
pub struct HttpRelayMailer {
    client: Client,
    url: String,
    accounts: Vec<MailAccount>,
}

impl HttpRelayMailer {
    /// # Errors
    /// Returns an error if the account list is empty or the client cannot be built.
    pub fn new(url: String, accounts: Vec<MailAccount>) -> Result<Self> {
        if accounts.is_empty() {
            return Err(anyhow!("no mail accounts configured"));
        }
        let client = Client::builder()
            .user_agent(crate::api::APP_USER_AGENT)
            .build()
            .context("Failed to build mail relay client")?;
        Ok(Self {
            client,
            url,
            accounts,
        })
    }

    fn pick_account(&self) -> &MailAccount {
        let index = rand::thread_rng().gen_range(0..self.accounts.len());
        &self.accounts[index]
    }
}

#[async_trait]
impl MailSender for HttpRelayMailer {
    async fn send(&self, mail: &OtpMail) -> Result<()> {
        let account = self.pick_account();
        let body = json!({
            "from": format!("\"Findex\" <{}>", account.user),
            "to": mail.to,
            "subject": mail.subject,
            "html": mail.html,
        });

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&account.user, Some(account.pass.expose_secret()))
            .json(&body)
            .send()
            .await
            .context("Mail relay request failed")?;

        if response.status().is_success() {
            info!(to = %mail.to, from = %account.user, "OTP mail delivered");
            Ok(())
        } else {
            Err(anyhow!("mail relay returned {}", response.status()))
        }
    }
}
