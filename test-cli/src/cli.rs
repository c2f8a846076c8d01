use std::num::ParseIntError;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::cmd::{self, mysql::MysqlCommand, postgres::PostgresCommand};
use crate::database::Kubectl;
use crate::error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_KUBECTL: &str = "kubectl";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Parser, Debug)]
#[command(
    name = "test-cli",
    version,
    about = "Database Branching Test Helper",
    after_help = "Examples:\n  \
        test-cli mysql verify-scenario test-mirrord env-val 2 4 \"full copy\" password123\n  \
        test-cli postgres verify-scenario test-mirrord env-val 5 5 4 \"full copy\""
)]
pub struct Cli {
    /// kubectl binary used to exec into database pods.
    #[arg(
        long,
        global = true,
        env = "KUBECTL",
        default_value = DEFAULT_KUBECTL,
        value_parser = kubectl_program
    )]
    pub kubectl: String,

    /// Hard cap on the whole invocation.
    #[arg(
        long,
        global = true,
        env = "TEST_CLI_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = timeout_secs
    )]
    pub timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// MySQL database operations
    #[command(subcommand)]
    Mysql(MysqlCommand),
    /// PostgreSQL database operations
    #[command(subcommand)]
    Postgres(PostgresCommand),
    /// Print version information
    Version,
}

// An empty env var reaches the value parser rather than the default.
fn kubectl_program(value: &str) -> std::result::Result<String, String> {
    match value.trim() {
        "" => Ok(DEFAULT_KUBECTL.to_string()),
        _ => Ok(value.to_string()),
    }
}

fn timeout_secs(value: &str) -> std::result::Result<u64, ParseIntError> {
    match value.trim() {
        "" => Ok(DEFAULT_TIMEOUT_SECS),
        secs => secs.parse(),
    }
}

impl Cli {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Runs the selected command under the global deadline.
    pub async fn run(self) -> Result<()> {
        let timeout = self.timeout();
        let kubectl = Kubectl::new(self.kubectl);

        let command = async move {
            match self.command {
                Command::Mysql(command) => cmd::mysql::run(command, kubectl).await,
                Command::Postgres(command) => cmd::postgres::run(command, kubectl).await,
                Command::Version => {
                    println!("test-cli version {VERSION}");
                    Ok(())
                }
            }
        };

        tokio::time::timeout(timeout, command)
            .await
            .unwrap_or(Err(Error::Deadline(timeout)))
    }
}
