use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("findex-auth")
        .about("Email OTP authentication backend")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("FINDEX_AUTH_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("FINDEX_AUTH_DSN")
                .required(true),
        )
        .arg(
            Arg::new("frontend-url")
                .long("frontend-url")
                .help("Frontend base URL, used for CORS and cookie security")
                .default_value("http://localhost:3000")
                .env("FINDEX_AUTH_FRONTEND_URL"),
        )
        .arg(
            Arg::new("access-token-secret")
                .long("access-token-secret")
                .help("HMAC secret used to sign access tokens")
                .env("FINDEX_AUTH_ACCESS_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("mail-url")
                .long("mail-url")
                .help("HTTP mail relay endpoint; when absent OTP mail is only logged")
                .env("FINDEX_AUTH_MAIL_URL"),
        )
        .arg(
            Arg::new("mail-accounts")
                .long("mail-accounts")
                .help("Comma separated sender accounts, user:pass[,user:pass...]")
                .env("FINDEX_AUTH_MAIL_ACCOUNTS"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("FINDEX_AUTH_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "findex-auth");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Email OTP authentication backend"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_check_port_and_dsn() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "findex-auth",
            "--dsn",
            "postgres://localhost/findex",
            "--access-token-secret",
            "hunter2",
            "--port",
            "8081",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8081));
        assert_eq!(
            matches.get_one::<String>("dsn").map(String::as_str),
            Some("postgres://localhost/findex")
        );
        assert_eq!(
            matches.get_one::<String>("frontend-url").map(String::as_str),
            Some("http://localhost:3000")
        );
    }

    #[test]
    fn test_default_verbosity_is_zero() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "findex-auth",
            "--dsn",
            "postgres://localhost/findex",
            "--access-token-secret",
            "hunter2",
        ]);
        assert_eq!(matches.get_one::<u8>("verbosity").map_or(0, |&v| v), 0);
    }
}
