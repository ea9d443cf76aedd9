//! Setup routines for tracing and logging of the inference run.
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use netmatch::passes::dsp::LOG_TARGET;

use tracing::{Metadata, Subscriber};
use tracing_appender::non_blocking;
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

fn log_filter(metadata: &Metadata<'_>) -> bool {
    metadata.target().starts_with(LOG_TARGET)
}

/// Everything the library emits, including the search internals.
fn verbose_filter(metadata: &Metadata<'_>) -> bool {
    metadata.target().starts_with("netmatch")
}

/// Keeps the file logger alive.
#[derive(Debug, Default)]
pub struct Tracer {
    /// Flushes the logfile when dropped.
    pub logfile: Option<non_blocking::WorkerGuard>,
}

impl Tracer {
    /// Setup tracing subscribers for stdout and file logging.
    pub fn setup_tracing(logfile: Option<PathBuf>, verbose: bool) -> io::Result<Self> {
        let mut tracer = Self::default();
        let file_layer = match logfile {
            Some(f) => Some(tracer.logfile_layer(f)?),
            None => None,
        };
        tracing_subscriber::registry()
            .with(tracer.stdout_layer(verbose))
            .with(file_layer)
            .init();
        Ok(tracer)
    }

    /// Initialize a file logger handle and non-blocking worker.
    fn init_writer(
        &self,
        file: PathBuf,
    ) -> io::Result<(non_blocking::NonBlocking, non_blocking::WorkerGuard)> {
        let writer = BufWriter::new(File::create(file)?);
        Ok(non_blocking(writer))
    }

    /// Clean log with the most important events.
    fn stdout_layer<S>(&mut self, verbose: bool) -> impl Layer<S>
    where
        S: Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        let level = if verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        tracing_subscriber::fmt::layer()
            .without_time()
            .with_target(false)
            .with_level(false)
            .with_filter(filter_fn(log_filter))
            .with_filter(level)
    }

    fn logfile_layer<S>(&mut self, logfile: PathBuf) -> io::Result<impl Layer<S>>
    where
        S: Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        let (non_blocking, guard) = self.init_writer(logfile)?;
        self.logfile = Some(guard);
        Ok(tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking)
            .with_filter(filter_fn(verbose_filter)))
    }
}
