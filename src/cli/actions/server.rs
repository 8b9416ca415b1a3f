use crate::api;
use crate::api::email::{self, LogMailSender, MailSender};
use crate::api::handlers::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        dsn,
        frontend_url,
        access_token_secret,
        mail_url,
        mail_accounts,
    } = action;

    let auth_config = AuthConfig::new(frontend_url).with_access_token_secret(access_token_secret);

    let mailer: Arc<dyn MailSender> = match (mail_url, mail_accounts) {
        (Some(url), Some(accounts)) => {
            let accounts = email::parse_mail_accounts(&accounts)
                .context("Failed to parse --mail-accounts")?;
            Arc::new(email::HttpRelayMailer::new(url, accounts)?)
        }
        _ => {
            // Development default: OTP codes land in the log, never on the wire.
            info!("No mail relay configured, using the logging sender");
            Arc::new(LogMailSender)
        }
    };

    api::new(port, dsn, auth_config, mailer).await
}
