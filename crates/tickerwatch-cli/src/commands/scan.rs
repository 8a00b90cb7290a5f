use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use time::OffsetDateTime;
use tickerwatch_core::validator::{default_stoplist, load_stoplist};
use tickerwatch_core::{
    normalize_subreddit, EntityTagger, HttpClient, MemoryMentionSink, MentionSink, Pipeline,
    PatternTagger, RegistryLoader, RemoteTagger, ReqwestHttpClient, RunError, RunStatus,
    TickerValidator, Warehouse, WarehouseConfig, WarehouseSink,
};
use tickerwatch_warehouse::resolve_home;
use tracing::{info, warn};

use crate::cli::{ScanArgs, TaggerKind};
use crate::error::CliError;
use crate::metadata::{rfc3339, write_run_metadata, RunId, RunSummary};
use crate::output::NdjsonWriter;

use super::CommandResult;

pub async fn run(args: &ScanArgs) -> Result<CommandResult, CliError> {
    let config = args.pipeline_config()?;
    let subreddit = normalize_subreddit(&args.subreddit)?;
    let home = resolve_home();
    let run_id = RunId::new_v4();
    let started_at = OffsetDateTime::now_utc();
    let started = Instant::now();

    let http: Arc<dyn HttpClient> =
        Arc::new(ReqwestHttpClient::with_user_agent(&config.fetcher.user_agent));

    let snapshot = RegistryLoader::new(Arc::clone(&http), home.join("cache").join("tickers.json"))
        .with_url(args.registry_url.as_str())
        .with_contact_email(args.contact_email.clone())
        .load()
        .await?;

    let stoplist = match args.stoplist.as_deref() {
        Some(path) => read_stoplist(path)?,
        None => default_stoplist(),
    };
    let validator = TickerValidator::new(
        args.validation_policy(stoplist)?,
        Arc::clone(&snapshot.registry),
    );
    let tagger = build_tagger(args, Arc::clone(&http))?;

    let memory = Arc::new(MemoryMentionSink::new());
    let warehouse = if args.dry_run {
        None
    } else {
        Some(Arc::new(Warehouse::open(WarehouseConfig::for_home(&home))?))
    };
    let sink: Arc<dyn MentionSink> = match &warehouse {
        Some(warehouse) => Arc::new(WarehouseSink::new(Arc::clone(warehouse), run_id.to_string())),
        None => memory.clone(),
    };

    let pipeline = Pipeline::new(http, config, tagger, validator, sink)?;
    info!(run_id = %run_id, subreddit = %subreddit, dry_run = args.dry_run, "scan started");
    let outcome = pipeline.run(&subreddit).await;

    let mut summary = RunSummary {
        run_id,
        subreddit: subreddit.clone(),
        status: RunStatus::Completed,
        registry_source: snapshot.source.as_str().to_string(),
        stats: pipeline.stats(),
        requests: pipeline.fetcher().issued(),
        cancelled_by: None,
        failure: None,
        started_at: rfc3339(started_at),
        finished_at: rfc3339(OffsetDateTime::now_utc()),
        elapsed_ms: started.elapsed().as_millis() as u64,
        dry_run: args.dry_run,
    };

    let report = match outcome {
        Ok(report) => report,
        Err(RunError::PersistenceLost { source, stats }) => {
            summary.status = RunStatus::Failed;
            summary.stats = stats;
            summary.failure = Some(source.to_string());
            persist_summary(&home, &summary, None);
            return Err(CliError::PersistenceLost(source.to_string()));
        }
        Err(RunError::Config(error)) => return Err(error.into()),
    };

    summary.status = report.status;
    summary.stats = report.stats;
    summary.requests = report.requests;
    summary.cancelled_by = report.cancelled_by.clone();

    if args.dry_run {
        let mut writer = NdjsonWriter::new(io::stdout().lock());
        for mention in memory.mentions() {
            writer.write(&mention)?;
        }
        writer.finish()?;
    }

    persist_summary(&home, &summary, warehouse.as_deref());

    let exit = CliError::for_status(
        summary.status,
        summary.stats.errors_skipped,
        summary.cancelled_by.as_deref(),
    );
    Ok(CommandResult::ok(serde_json::to_value(&summary)?).with_exit(exit))
}

fn read_stoplist(path: &Path) -> Result<std::collections::BTreeSet<String>, CliError> {
    load_stoplist(path).map_err(|error| {
        CliError::Usage(format!("cannot read stoplist {}: {error}", path.display()))
    })
}

fn build_tagger(
    args: &ScanArgs,
    http: Arc<dyn HttpClient>,
) -> Result<Arc<dyn EntityTagger>, CliError> {
    match args.tagger {
        TaggerKind::Pattern => Ok(Arc::new(PatternTagger::with_max_input_len(args.chunk_size))),
        TaggerKind::Remote => {
            let url = args.tagger_url.as_deref().ok_or_else(|| {
                CliError::Usage(String::from("--tagger remote requires --tagger-url"))
            })?;
            Ok(Arc::new(
                RemoteTagger::new(http, url, args.chunk_size).with_timeout_ms(args.timeout_ms),
            ))
        }
    }
}

/// The metadata artifact and run log are best effort: a failure here is
/// logged and never changes the run's outcome.
fn persist_summary(home: &Path, summary: &RunSummary, warehouse: Option<&Warehouse>) {
    match write_run_metadata(home, summary) {
        Ok(path) => info!(path = %path.display(), "run metadata written"),
        Err(error) => warn!(error = %error, "failed to write run metadata"),
    }

    if let Some(warehouse) = warehouse {
        if let Err(error) = warehouse.record_run(&summary.to_record()) {
            warn!(error = %error, "failed to record run in warehouse");
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Command};

    fn scan_args(extra: &[&str]) -> ScanArgs {
        let argv = ["tickerwatch", "scan", "stocks"].iter().chain(extra.iter());
        match Cli::try_parse_from(argv).expect("parse").command {
            Command::Scan(args) => args,
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn remote_tagger_without_url_is_a_usage_error() {
        let args = scan_args(&["--tagger", "remote"]);
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());

        let error = build_tagger(&args, http).err().expect("usage error");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn pattern_tagger_takes_chunk_size_as_bound() {
        let args = scan_args(&["--chunk-size", "64"]);
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());

        let Ok(tagger) = build_tagger(&args, http) else {
            panic!("pattern tagger needs no configuration");
        };
        assert_eq!(tagger.max_input_len(), 64);
    }

    #[test]
    fn missing_stoplist_file_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let error = read_stoplist(&temp.path().join("absent.txt")).expect_err("missing");
        assert!(error.to_string().contains("absent.txt"));
    }
}
