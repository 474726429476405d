//! Command-line parsing
//!
//! Usage:
//!
//! ```text
//! booking-client [--config <path>] [--metrics] login <access> <refresh>
//! booking-client [--config <path>] [--metrics] logout
//! booking-client [--config <path>] [--metrics] get <path>...
//! ```

use anyhow::{Result, bail};

pub const USAGE: &str = "usage: booking-client [--config <path>] [--metrics] \
                         (login <access> <refresh> | logout | get <path>...)";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Store a freshly issued credential pair
    Login { access: String, refresh: String },
    /// Clear stored credentials
    Logout,
    /// Fetch every path concurrently through one client
    Get { paths: Vec<String> },
}

#[derive(Debug, PartialEq, Eq)]
pub struct Cli {
    pub config_path: Option<String>,
    /// Print the Prometheus exposition after the command
    pub metrics: bool,
    pub command: Command,
}

impl Cli {
    /// Parse arguments, excluding the program name.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut config_path = None;
        let mut metrics = false;
        let mut positional = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => match args.next() {
                    Some(path) => config_path = Some(path),
                    None => bail!("--config requires a path\n{USAGE}"),
                },
                "--metrics" => metrics = true,
                flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let command = match positional.next().as_deref() {
            Some("login") => match (positional.next(), positional.next(), positional.next()) {
                (Some(access), Some(refresh), None) => Command::Login { access, refresh },
                _ => bail!("login takes exactly <access> <refresh>\n{USAGE}"),
            },
            Some("logout") => {
                if positional.next().is_some() {
                    bail!("logout takes no arguments\n{USAGE}");
                }
                Command::Logout
            }
            Some("get") => {
                let paths: Vec<String> = positional.collect();
                if paths.is_empty() {
                    bail!("get needs at least one path\n{USAGE}");
                }
                Command::Get { paths }
            }
            Some(other) => bail!("unknown command {other}\n{USAGE}"),
            None => bail!("{USAGE}"),
        };

        Ok(Self {
            config_path,
            metrics,
            command,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli> {
        Cli::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_get_with_flags_anywhere() {
        let cli = parse(&["get", "/rooms", "--metrics", "/bookings", "--config", "c.toml"]).unwrap();
        assert_eq!(
            cli,
            Cli {
                config_path: Some("c.toml".into()),
                metrics: true,
                command: Command::Get {
                    paths: vec!["/rooms".into(), "/bookings".into()]
                },
            }
        );
    }

    #[test]
    fn parses_login_and_logout() {
        assert_eq!(
            parse(&["login", "at_1", "rt_1"]).unwrap().command,
            Command::Login {
                access: "at_1".into(),
                refresh: "rt_1".into()
            }
        );
        let cli = parse(&["logout"]).unwrap();
        assert_eq!(cli.command, Command::Logout);
        assert!(!cli.metrics);
        assert!(cli.config_path.is_none());
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["login", "at_1"]).is_err());
        assert!(parse(&["login", "a", "b", "c"]).is_err());
        assert!(parse(&["logout", "now"]).is_err());
        assert!(parse(&["get"]).is_err());
        assert!(parse(&["book", "/rooms/1"]).is_err());
        assert!(parse(&["get", "/rooms", "--config"]).is_err());
        assert!(parse(&["--verbose", "logout"]).is_err());
    }
}
