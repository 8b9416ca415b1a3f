pub mod server;

use anyhow::Result;
use secrecy::SecretString;

/// Actions the CLI can dispatch to.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        frontend_url: String,
        access_token_secret: SecretString,
        mail_url: Option<String>,
        mail_accounts: Option<String>,
    },
}

impl Action {
    /// Execute the action
    /// # Errors
    /// Returns an error if the action fails
    pub async fn execute(self) -> Result<()> {
        match self {
            Action::Server { .. } => server::handle(self).await,
        }
    }
}
