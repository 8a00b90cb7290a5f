use serde_json::json;
use tickerwatch_core::{QueryGuardrails, Warehouse, WarehouseConfig};
use tickerwatch_warehouse::resolve_home;
use tracing::warn;

use crate::cli::SqlArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &SqlArgs) -> Result<CommandResult, CliError> {
    let query = args.query.trim();
    if query.is_empty() {
        return Err(CliError::Usage(String::from("query must not be empty")));
    }

    let warehouse = Warehouse::open(WarehouseConfig::for_home(resolve_home()))?;
    let guardrails = QueryGuardrails {
        max_rows: args.max_rows,
        query_timeout_ms: args.query_timeout_ms,
    };
    let result = warehouse.execute_query(query, guardrails)?;

    if result.truncated {
        warn!(
            rows = result.row_count,
            "result truncated (use --max-rows to increase limit)"
        );
    }

    Ok(CommandResult::ok(json!({
        "columns": result.columns,
        "rows": result.rows,
        "row_count": result.row_count,
        "truncated": result.truncated,
    })))
}
