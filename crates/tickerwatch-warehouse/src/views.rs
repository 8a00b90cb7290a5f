//! Analytical views over stored mentions.

use ::duckdb::Connection;

/// Create the analytical views.
///
/// - `vw_ticker_counts`: mentions and distinct submissions per ticker and subreddit
/// - `vw_ticker_daily`: mentions per ticker per UTC day, with the summed score
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE OR REPLACE VIEW vw_ticker_counts AS
SELECT
    ticker,
    subreddit,
    COUNT(*) AS mentions,
    COUNT(DISTINCT submission_id) AS submissions,
    SUM(score) AS total_score
FROM mentions
GROUP BY ticker, subreddit;

CREATE OR REPLACE VIEW vw_ticker_daily AS
SELECT
    ticker,
    CAST(CAST(created_utc AS TIMESTAMP) AS DATE) AS day,
    COUNT(*) AS mentions,
    SUM(score) AS total_score
FROM mentions
GROUP BY ticker, day;
"#,
    )?;

    Ok(())
}
