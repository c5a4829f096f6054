//! Running the whole show.
//!
//! This module wires the pieces together: it loads the trust anchors
//! and local exceptions, binds the RTR listener, and then alternates
//! between validation cycles and waiting for the next refresh until
//! told to stop. A cycle that fails or overruns its deadline leaves the
//! previously served data untouched.

use std::fmt;
use std::time::Duration;
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use crate::config::Config;
use crate::engine::Engine;
use crate::payload::SharedHistory;
use crate::rsync;
use crate::rtr::server::{NotifySender, Server};
use crate::slurm::LocalExceptions;
use crate::tal::Tal;


/// How long to keep serving while shutting down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);


//------------ run -----------------------------------------------------------

/// Runs the validator until it is told to stop.
///
/// Everything that makes the process unable to do its job – no usable
/// trust anchor, an unreadable SLURM file, a busy listen port – is a
/// fatal error here; later failures only ever affect a single cycle or
/// connection.
pub async fn run(config: Config) -> Result<(), ExitError> {
    let tals = load_tals(&config)?;
    let exceptions = load_exceptions(&config)?;
    let cache = rsync::Cache::new(
        config.cache_dir.clone(),
        config.rsync_command.clone(),
        config.rsync_args.clone(),
        config.fetch_concurrency,
    ).map_err(|err| {
        error!(
            "Fatal: cannot create cache directory {}: {}",
            config.cache_dir.display(), err
        );
        ExitError
    })?;
    let engine = Engine::new(
        cache, tals, config.strict, config.parse_gbr
    );

    let history = SharedHistory::new(
        config.history_size, config.timing()
    );
    let notify = NotifySender::new();

    // Bind the RTR listener before the first cycle so routers can
    // connect right away; they get "no data available" until the
    // first snapshot is in.
    let listener = TcpListener::bind(config.rtr_listen).await.map_err(
        |err| {
            error!(
                "Fatal: cannot bind RTR listener to {}: {}",
                config.rtr_listen, err
            );
            ExitError
        }
    )?;
    info!("RTR server listening on {}", config.rtr_listen);
    let server = Server::new(
        TcpListenerStream::new(listener),
        notify.clone(),
        history.clone(),
        config.rtr_timeout,
    );
    tokio::spawn(async move {
        if let Err(err) = server.run().await {
            error!("RTR listener failed: {}", err);
        }
    });

    loop {
        run_cycle(&config, &engine, &exceptions, &history, &notify).await;

        tokio::select! {
            _ = tokio::time::sleep(config.refresh) => { }
            _ = shutdown_signal() => {
                info!("Shutting down.");
                tokio::time::sleep(SHUTDOWN_GRACE).await;
                return Ok(())
            }
        }
    }
}

/// Runs a single validation cycle and publishes its outcome.
async fn run_cycle(
    config: &Config,
    engine: &Engine,
    exceptions: &LocalExceptions,
    history: &SharedHistory,
    notify: &NotifySender,
) {
    info!("Starting validation cycle.");
    let report = match tokio::time::timeout(
        config.deadline, engine.run()
    ).await {
        Ok(report) => report,
        Err(_) => {
            // The deadline struck. The partial result is dropped and
            // whatever snapshot is current stays in place.
            error!(
                "Validation cycle exceeded its deadline, \
                 keeping previous data set."
            );
            return
        }
    };
    let snapshot = report.into_snapshot(exceptions);
    info!("Validation complete, {} payload items.", snapshot.len());
    if history.update(snapshot) {
        notify.notify();
    }
}

/// Loads all trust anchor locators.
fn load_tals(config: &Config) -> Result<Vec<Tal>, ExitError> {
    let iter = Tal::read_dir(&config.tal_dir).map_err(|err| {
        error!(
            "Fatal: cannot open TAL directory {}: {}",
            config.tal_dir.display(), err
        );
        ExitError
    })?;
    let mut res = Vec::new();
    for tal in iter {
        match tal {
            Ok(tal) => res.push(tal),
            Err(err) => {
                // One bad TAL should not take down the valid ones,
                // but it is worth shouting about.
                warn!("Skipping bad TAL: {}", err);
            }
        }
    }
    if res.is_empty() {
        error!(
            "Fatal: no usable TALs in {}", config.tal_dir.display()
        );
        return Err(ExitError)
    }
    Ok(res)
}

/// Loads the local exceptions if configured.
fn load_exceptions(config: &Config) -> Result<LocalExceptions, ExitError> {
    match config.slurm.as_ref() {
        Some(path) => {
            LocalExceptions::load(path).map_err(|err| {
                error!(
                    "Fatal: cannot load SLURM file {}: {}",
                    path.display(), err
                );
                ExitError
            })
        }
        None => Ok(LocalExceptions::default())
    }
}

/// Resolves when the process is asked to terminate.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = term.recv() => { }
                    _ = tokio::signal::ctrl_c() => { }
                }
            }
            Err(err) => {
                error!("Cannot listen for SIGTERM: {}", err);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}


//------------ ExitError -----------------------------------------------------

/// The process failed and should exit with a non-zero status.
///
/// All diagnostics have been logged by the time this is returned.
#[derive(Clone, Copy, Debug)]
pub struct ExitError;

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("fatal error, exiting")
    }
}

impl std::error::Error for ExitError { }
