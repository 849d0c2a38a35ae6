use std::fs;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use tracker_core::{update, Msg, OperationRequest, Route, TrackerState, TrackerViewModel};
use tracker_engine::{EngineHandle, SessionStore};
use tracker_logging::tracker_info;

use super::cli::{Cli, Command};
use super::config::AppConfig;
use super::effects::EffectRunner;
use super::logging::{self, LogDestination};
use super::render::Printer;

/// Longest wait for an engine event before the loop ticks.
const TICK: Duration = Duration::from_millis(250);

pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    let destination = if cli.log {
        LogDestination::Both
    } else {
        LogDestination::Terminal
    };
    logging::initialize(destination, cli.verbose);

    let config = AppConfig::load(&cli.config)?.with_env();
    let store = SessionStore::new(
        std::env::current_dir().context("resolving the working directory")?,
    );
    let first = initial_msg(&cli.command, &config, &store)?;

    let engine = EngineHandle::new(config.backend_settings(), config.poll_policy())
        .map_err(|err| anyhow!("cannot use {}: {err}", config.base_url))?;
    let mut runner = EffectRunner::new(engine, store);
    let mut printer = Printer::default();
    let mut state = TrackerState::with_policy(config.poll_policy());

    let detach_at = cli
        .detach_after
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut detached = false;

    let mut next = first;
    loop {
        state = dispatch(state, next, &mut runner, &mut printer);
        if state.is_settled() {
            break;
        }
        if !detached && detach_at.is_some_and(|at| Instant::now() >= at) {
            detached = true;
            tracker_info!("detaching from the live stream");
            next = Msg::DetachStream;
            continue;
        }
        next = runner.next_msg(TICK).unwrap_or(Msg::Tick);
    }

    let outcome = state.view();
    dispatch(state, Msg::Teardown, &mut runner, &mut printer);
    Ok(exit_code(&outcome))
}

fn dispatch(
    state: TrackerState,
    msg: Msg,
    runner: &mut EffectRunner,
    printer: &mut Printer,
) -> TrackerState {
    let (mut state, effects) = update(state, msg);
    runner.run(effects);
    if state.consume_dirty() {
        for line in printer.frame(&state.view()) {
            println!("{line}");
        }
    }
    state
}

fn initial_msg(command: &Command, config: &AppConfig, store: &SessionStore) -> anyhow::Result<Msg> {
    let msg = match command {
        Command::Search { query, owner } => Msg::Submit(OperationRequest::Search {
            query: query.clone(),
            owner: owner.clone().or_else(|| config.owner.clone()),
        }),
        Command::Upload { csv } => {
            let content = fs::read_to_string(csv)
                .with_context(|| format!("reading {}", csv.display()))?;
            let filename = csv
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.csv".to_string());
            Msg::Submit(OperationRequest::UploadJob {
                filename,
                csv: content,
            })
        }
        Command::Resume { route: Some(raw) } => {
            let route =
                Route::parse(raw).ok_or_else(|| anyhow!("{raw:?} does not name a session"))?;
            Msg::Resume(route)
        }
        Command::Resume { route: None } => {
            let route = store
                .load()
                .with_context(|| format!("reading {}", store.path().display()))?
                .ok_or_else(|| anyhow!("no tracked session to resume; pass a route"))?;
            Msg::Resume(route)
        }
        Command::List { owner } => Msg::HistoryRequested {
            owner: owner.clone(),
        },
    };
    Ok(msg)
}

fn exit_code(view: &TrackerViewModel) -> ExitCode {
    if view.failure.is_some() || view.error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
