pub mod auth;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_DB_PASSWORD: &str = "db-password";
pub const ARG_DB_MAX_CONNECTIONS: &str = "db-max-connections";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("sqlm-auth")
        .about("Account, team and token authority for SQL Manager")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("SQLM_AUTH_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "Database connection string, postgres://user@host:5432/sqlm. Use memory:// for a throwaway in-process store.",
                )
                .env("SQLM_AUTH_DSN")
                .required(true),
        )
        .arg(
            Arg::new(ARG_DB_PASSWORD)
                .long(ARG_DB_PASSWORD)
                .help("Database password, injected into the DSN")
                .env("SQLM_AUTH_DB_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DB_MAX_CONNECTIONS)
                .long(ARG_DB_MAX_CONNECTIONS)
                .help("Maximum number of pooled database connections")
                .env("SQLM_AUTH_DB_MAX_CONNECTIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        );

    let command = auth::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DSN: &str = "postgres://sqlm@localhost:5432/sqlm";

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "sqlm-auth");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Account, team and token authority for SQL Manager".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars(
            [
                ("SQLM_AUTH_PORT", None::<&str>),
                ("SQLM_AUTH_DB_MAX_CONNECTIONS", None),
                ("SQLM_AUTH_TOKEN_TTL_SECONDS", None),
                ("SQLM_AUTH_STORAGE_TIMEOUT_SECONDS", None),
                ("SQLM_AUTH_ADMIN_TEAM", None),
                ("SQLM_AUTH_LOG_LEVEL", None),
            ],
            || {
                let matches = new().get_matches_from(vec!["sqlm-auth", "--dsn", DSN]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8080));
                assert_eq!(
                    matches.get_one::<u32>(ARG_DB_MAX_CONNECTIONS).copied(),
                    Some(5)
                );
                assert_eq!(
                    matches.get_one::<u64>(auth::ARG_TOKEN_TTL_SECONDS).copied(),
                    Some(86400)
                );
                assert_eq!(
                    matches
                        .get_one::<u64>(auth::ARG_STORAGE_TIMEOUT_SECONDS)
                        .copied(),
                    Some(3)
                );
                assert_eq!(
                    matches.get_one::<String>(auth::ARG_ADMIN_TEAM).cloned(),
                    Some("admins".to_string())
                );
                assert_eq!(matches.get_count(logging::ARG_VERBOSITY), 0);
                assert_eq!(matches.get_one::<u8>(logging::ARG_LOG_LEVEL), None);
            },
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("SQLM_AUTH_PORT", Some("443")),
                ("SQLM_AUTH_DSN", Some(DSN)),
                ("SQLM_AUTH_DB_PASSWORD", Some("secret")),
                ("SQLM_AUTH_TOKEN_TTL_SECONDS", Some("60")),
                ("SQLM_AUTH_POLICY_FILE", Some("/etc/sqlm/roles.json")),
                ("SQLM_AUTH_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["sqlm-auth"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>(ARG_DSN).cloned(),
                    Some(DSN.to_string())
                );
                assert_eq!(
                    matches.get_one::<String>(ARG_DB_PASSWORD).cloned(),
                    Some("secret".to_string())
                );
                assert_eq!(
                    matches.get_one::<u64>(auth::ARG_TOKEN_TTL_SECONDS).copied(),
                    Some(60)
                );
                assert_eq!(
                    matches
                        .get_one::<std::path::PathBuf>(auth::ARG_POLICY_FILE)
                        .and_then(|path| path.to_str()),
                    Some("/etc/sqlm/roles.json")
                );
                assert_eq!(matches.get_one::<u8>(logging::ARG_LOG_LEVEL).copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("SQLM_AUTH_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["sqlm-auth".to_string(), "--dsn".to_string(), DSN.to_string()];

                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);

                assert_eq!(
                    Some(matches.get_count(logging::ARG_VERBOSITY)),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_dsn_is_required() {
        temp_env::with_vars([("SQLM_AUTH_DSN", None::<&str>)], || {
            let result = new().try_get_matches_from(vec!["sqlm-auth"]);
            assert_eq!(
                result.map_err(|e| e.kind()).err(),
                Some(clap::error::ErrorKind::MissingRequiredArgument)
            );
        });
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        temp_env::with_vars([("SQLM_AUTH_TOKEN_TTL_SECONDS", None::<&str>)], || {
            let result = new().try_get_matches_from(vec![
                "sqlm-auth",
                "--dsn",
                DSN,
                "--token-ttl-seconds",
                "0",
            ]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_admin_email_requires_password() {
        temp_env::with_vars(
            [
                ("SQLM_AUTH_ADMIN_EMAIL", None::<&str>),
                ("SQLM_AUTH_ADMIN_PASSWORD", None),
            ],
            || {
                let result = new().try_get_matches_from(vec![
                    "sqlm-auth",
                    "--dsn",
                    DSN,
                    "--admin-email",
                    "root@example.com",
                ]);
                assert_eq!(
                    result.map_err(|e| e.kind()).err(),
                    Some(clap::error::ErrorKind::MissingRequiredArgument)
                );
            },
        );
    }
}
