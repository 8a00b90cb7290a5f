use serde_json::{json, Value};
use tickerwatch_core::{normalize_subreddit, QueryGuardrails, Warehouse, WarehouseConfig};
use tickerwatch_warehouse::resolve_home;

use crate::cli::TopArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &TopArgs) -> Result<CommandResult, CliError> {
    let query = top_query(args)?;
    let warehouse = Warehouse::open(WarehouseConfig::for_home(resolve_home()))?;
    let result = warehouse.execute_query(&query, QueryGuardrails::default())?;

    let tickers: Vec<Value> = result
        .rows
        .into_iter()
        .filter_map(|row| match row.as_slice() {
            [ticker, mentions, submissions, total_score] => Some(json!({
                "ticker": ticker,
                "mentions": mentions,
                "submissions": submissions,
                "total_score": total_score,
            })),
            _ => None,
        })
        .collect();

    Ok(CommandResult::ok(json!({
        "subreddit": args.subreddit.as_deref().map(normalize_subreddit).transpose()?,
        "tickers": tickers,
    })))
}

/// The subreddit filter is interpolated only after normalization, which
/// restricts it to ASCII letters, digits and underscores.
fn top_query(args: &TopArgs) -> Result<String, CliError> {
    if args.limit == 0 {
        return Err(CliError::Usage(String::from("--limit must be greater than zero")));
    }

    let filter = match args.subreddit.as_deref() {
        Some(raw) => format!(
            "WHERE lower(subreddit) = '{}' ",
            normalize_subreddit(raw)?.to_ascii_lowercase()
        ),
        None => String::new(),
    };

    Ok(format!(
        "SELECT ticker, SUM(mentions) AS mentions, SUM(submissions) AS submissions, \
         SUM(total_score) AS total_score FROM vw_ticker_counts {filter}\
         GROUP BY ticker ORDER BY 2 DESC, 1 LIMIT {}",
        args.limit
    ))
}
