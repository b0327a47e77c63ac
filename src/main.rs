use std::{collections::BTreeMap, process};

use folio::{
    application::error::AppError,
    cache::{CacheClient, CacheController, ResultView, SharedCache, select_result},
    config,
    domain::query::Query,
    infra::{event_log, fixture::FixtureTransport, telemetry},
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        config::Command::Fingerprint(args) => run_fingerprint(args),
        config::Command::Replay(args) => run_replay(settings, args).await,
        config::Command::Browse(args) => run_browse(settings, args).await,
    }
}

#[derive(Serialize)]
struct FingerprintOutput<'a> {
    fingerprint: &'a str,
    digest: String,
    search: String,
    page_limit: u32,
}

fn run_fingerprint(args: config::FingerprintArgs) -> Result<(), AppError> {
    let query = build_query(&args.resource, &args.search, args.namespace.as_deref())?;
    let fingerprint = query.fingerprint();

    print_json(&FingerprintOutput {
        fingerprint: fingerprint.as_str(),
        digest: fingerprint.digest(),
        search: query.to_search(),
        page_limit: query.page_limit(),
    })
}

#[derive(Serialize)]
struct ReplayOutput {
    version: u64,
    generation: u64,
    objects: usize,
    windows: BTreeMap<String, ResultView>,
}

async fn run_replay(settings: config::Settings, args: config::ReplayArgs) -> Result<(), AppError> {
    let events = event_log::read_event_log(&args.file).await?;
    let controller = CacheController::replay(settings.cache_config(), events);
    let state = controller.state();

    let windows = state
        .windows()
        .map(|(fingerprint, window)| {
            (
                fingerprint.to_string(),
                select_result(window, state.objects()),
            )
        })
        .collect();

    print_json(&ReplayOutput {
        version: state.version(),
        generation: state.generation(),
        objects: state.objects().len(),
        windows,
    })
}

#[derive(Serialize)]
struct BrowseOutput {
    fingerprint: String,
    pages: u32,
    #[serde(flatten)]
    view: ResultView,
}

async fn run_browse(settings: config::Settings, args: config::BrowseArgs) -> Result<(), AppError> {
    let query = build_query(&args.resource, &args.search, args.namespace.as_deref())?;
    let fingerprint = query.fingerprint();
    let transport = FixtureTransport::load(&args.dataset).await?;
    let client = CacheClient::new(SharedCache::new(settings.cache_config()), transport);

    let mut pages = 0u32;
    if client.fetch_if_needed(&query).await?.is_some() {
        pages += 1;
    }
    while pages < args.pages && client.cache().can_request_next(&fingerprint) {
        client.fetch_next(&query).await?;
        pages += 1;
    }

    let view = client.cache().select(&fingerprint);
    info!(
        window = %fingerprint.digest(),
        pages,
        results = view.results.len(),
        has_more = view.has_more,
        "Browse complete"
    );

    if let Some(path) = args.record.as_ref() {
        let history: Vec<_> = client
            .cache()
            .read(|cache| cache.history().cloned().collect());
        let written = event_log::write_event_log(path, &history).await?;
        info!(path = %path.display(), events = written, "Recorded event log");
    }

    print_json(&BrowseOutput {
        fingerprint: fingerprint.to_string(),
        pages,
        view,
    })
}

fn build_query(resource: &str, search: &str, namespace: Option<&str>) -> Result<Query, AppError> {
    let resource = resource.trim();
    if resource.is_empty() {
        return Err(AppError::validation("resource must not be empty"));
    }
    Ok(Query::from_search(resource, search, &[], namespace))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
