use crate::cli::actions::Action;
use anyhow::Result;
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        frontend_url: matches
            .get_one("frontend-url")
            .map(|s: &String| s.to_string())
            .unwrap_or_else(|| "http://localhost:3000".to_string()),
        access_token_secret: matches
            .get_one("access-token-secret")
            .map(|s: &String| SecretString::from(s.clone()))
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --access-token-secret"))?,
        mail_url: matches.get_one("mail-url").map(|s: &String| s.to_string()),
        mail_accounts: matches
            .get_one("mail-accounts")
            .map(|s: &String| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_action() -> Result<()> {
        let matches = commands::new().get_matches_from(vec![
            "findex-auth",
            "--dsn",
            "postgres://localhost/findex",
            "--access-token-secret",
            "hunter2",
            "--frontend-url",
            "https://app.findex.dev",
        ]);

        let Action::Server {
            port,
            dsn,
            frontend_url,
            access_token_secret,
            mail_url,
            mail_accounts,
        } = handler(&matches)?;

        assert_eq!(port, 8080);
        assert_eq!(dsn, "postgres://localhost/findex");
        assert_eq!(frontend_url, "https://app.findex.dev");
        assert_eq!(access_token_secret.expose_secret(), "hunter2");
        assert!(mail_url.is_none());
        assert!(mail_accounts.is_none());
        Ok(())
    }
}
