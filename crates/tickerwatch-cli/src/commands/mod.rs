mod scan;
mod sql;
mod top;

use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Output of a command, plus the error to exit with once it is printed.
pub struct CommandResult {
    pub data: Value,
    pub exit: Option<CliError>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self { data, exit: None }
    }

    pub fn with_exit(mut self, exit: Option<CliError>) -> Self {
        self.exit = exit;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    match &cli.command {
        Command::Scan(args) => scan::run(args).await,
        Command::Top(args) => top::run(args),
        Command::Sql(args) => sql::run(args),
    }
}
