use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::path::PathBuf;

pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_STORAGE_TIMEOUT_SECONDS: &str = "storage-timeout-seconds";
pub const ARG_POLICY_FILE: &str = "policy-file";
pub const ARG_ADMIN_EMAIL: &str = "admin-email";
pub const ARG_ADMIN_PASSWORD: &str = "admin-password";
pub const ARG_ADMIN_TEAM: &str = "admin-team";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_admin_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Login and read-only token lifetime in seconds")
                .env("SQLM_AUTH_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_STORAGE_TIMEOUT_SECONDS)
                .long(ARG_STORAGE_TIMEOUT_SECONDS)
                .help("Upper bound for a single storage call in seconds")
                .env("SQLM_AUTH_STORAGE_TIMEOUT_SECONDS")
                .default_value("3")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_POLICY_FILE)
                .long(ARG_POLICY_FILE)
                .help("JSON file mapping roles to permission codes")
                .long_help(
                    "JSON file mapping roles to permission codes, {\"roles\": {\"admin\": [\"users-write\"]}}. The built-in policy is used when omitted.",
                )
                .env("SQLM_AUTH_POLICY_FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
}

fn with_admin_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_EMAIL)
                .long(ARG_ADMIN_EMAIL)
                .help("Email of the administrator account ensured at startup")
                .env("SQLM_AUTH_ADMIN_EMAIL")
                .requires(ARG_ADMIN_PASSWORD),
        )
        .arg(
            Arg::new(ARG_ADMIN_PASSWORD)
                .long(ARG_ADMIN_PASSWORD)
                .help("Password of the administrator account, only used when it is created")
                .env("SQLM_AUTH_ADMIN_PASSWORD")
                .hide_env_values(true)
                .requires(ARG_ADMIN_EMAIL),
        )
        .arg(
            Arg::new(ARG_ADMIN_TEAM)
                .long(ARG_ADMIN_TEAM)
                .help("Team of the administrator account")
                .env("SQLM_AUTH_ADMIN_TEAM")
                .default_value("admins"),
        )
}

#[derive(Debug)]
pub struct Admin {
    pub email: String,
    pub password: SecretString,
    pub team: String,
}

#[derive(Debug)]
pub struct Options {
    pub token_ttl_seconds: u64,
    pub storage_timeout_seconds: u64,
    pub policy_file: Option<PathBuf>,
    pub admin: Option<Admin>,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let token_ttl_seconds = matches
            .get_one::<u64>(ARG_TOKEN_TTL_SECONDS)
            .copied()
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_TOKEN_TTL_SECONDS}"))?;
        let storage_timeout_seconds = matches
            .get_one::<u64>(ARG_STORAGE_TIMEOUT_SECONDS)
            .copied()
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_STORAGE_TIMEOUT_SECONDS}"))?;

        let admin = match (
            matches.get_one::<String>(ARG_ADMIN_EMAIL),
            matches.get_one::<String>(ARG_ADMIN_PASSWORD),
        ) {
            (Some(email), Some(password)) => Some(Admin {
                email: email.clone(),
                password: SecretString::from(password.clone()),
                team: matches
                    .get_one::<String>(ARG_ADMIN_TEAM)
                    .cloned()
                    .unwrap_or_else(|| "admins".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            token_ttl_seconds,
            storage_timeout_seconds,
            policy_file: matches.get_one::<PathBuf>(ARG_POLICY_FILE).cloned(),
            admin,
        })
    }
}
