//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action to run, currently always the
//! API server with its full configuration.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, ARG_DB_MAX_CONNECTIONS, ARG_DB_PASSWORD, ARG_DSN, ARG_PORT};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let db_password = matches
        .get_one::<String>(ARG_DB_PASSWORD)
        .map(|password| SecretString::from(password.clone()));
    let db_max_connections = matches
        .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
        .copied()
        .unwrap_or(5);

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        db_password,
        db_max_connections,
        token_ttl_seconds: auth_opts.token_ttl_seconds,
        storage_timeout_seconds: auth_opts.storage_timeout_seconds,
        policy_file: auth_opts.policy_file,
        admin: auth_opts.admin,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn clean_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("SQLM_AUTH_DSN", None::<&str>),
                ("SQLM_AUTH_DB_PASSWORD", None),
                ("SQLM_AUTH_ADMIN_EMAIL", None),
                ("SQLM_AUTH_ADMIN_PASSWORD", None),
                ("SQLM_AUTH_ADMIN_TEAM", None),
                ("SQLM_AUTH_TOKEN_TTL_SECONDS", None),
                ("SQLM_AUTH_POLICY_FILE", None),
            ],
            f,
        );
    }

    #[test]
    fn server_action_from_flags() {
        clean_env(|| {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "sqlm-auth",
                "--dsn",
                "postgres://sqlm@localhost/sqlm",
                "--db-password",
                "hunter22",
                "--token-ttl-seconds",
                "120",
                "--admin-email",
                "root@example.com",
                "--admin-password",
                "correct horse",
            ]);

            let Action::Server(args) = handler(&matches).unwrap();
            assert_eq!(args.port, 8080);
            assert_eq!(args.dsn, "postgres://sqlm@localhost/sqlm");
            assert_eq!(
                args.db_password.as_ref().map(|p| p.expose_secret()),
                Some("hunter22")
            );
            assert_eq!(args.token_ttl_seconds, 120);
            assert!(args.policy_file.is_none());

            let admin = args.admin.unwrap();
            assert_eq!(admin.email, "root@example.com");
            assert_eq!(admin.password.expose_secret(), "correct horse");
            assert_eq!(admin.team, "admins");
        });
    }

    #[test]
    fn admin_is_optional() {
        clean_env(|| {
            let matches =
                crate::cli::commands::new().get_matches_from(vec!["sqlm-auth", "--dsn", "memory://"]);

            let Action::Server(args) = handler(&matches).unwrap();
            assert!(args.admin.is_none());
            assert!(args.db_password.is_none());
        });
    }
}
