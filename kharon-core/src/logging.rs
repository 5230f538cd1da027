//! Tracing setup (`SPEC_FULL.md` §2), in the manner of the teacher's
//! `env-tracing-logger`: a compact, uptime-stamped `fmt` layer plus
//! `EnvFilter::from_default_env()`, so `RUST_LOG` controls verbosity the
//! same way it does throughout the rest of the pack.

use std::io::Write;
use std::sync::Mutex;
use tracing_subscriber::{
    fmt::{self, format, time, MakeWriter},
    prelude::*,
    EnvFilter,
};

/// A writer that flushes stderr after every event, the re-expression of
/// the original core's "immediate logger" mode (spec §6 `-l`): useful
/// when tailing a process that might crash before its normal buffering
/// would flush.
#[derive(Clone, Default)]
struct ImmediateStderr;

impl Write for ImmediateStderr {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut stderr = std::io::stderr();
        let n = stderr.write(buf)?;
        stderr.flush()?;
        Ok(n)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ImmediateStderr {
    type Writer = ImmediateStderr;
    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// A writer that tees events to a secondary output file (spec §6 `-f
/// <file>`) in addition to stderr.
struct TeeWriter {
    file: std::sync::Arc<Mutex<std::fs::File>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        self.file.lock().unwrap().write_all(buf)?;
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        self.file.lock().unwrap().flush()
    }
}

impl<'a> MakeWriter<'a> for TeeWriter {
    type Writer = TeeWriter;
    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter { file: self.file.clone() }
    }
}

/// Initialize global tracing. `immediate` selects the unbuffered writer
/// (`-l`); `secondary_output` additionally tees every event to a file
/// (`-f <file>`).
pub fn init(immediate: bool, secondary_output: Option<&std::path::Path>) -> anyhow::Result<()> {
    let evt_fmt = format().with_timer(time::Uptime::default()).compact();

    if let Some(path) = secondary_output {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        let writer = TeeWriter { file: std::sync::Arc::new(Mutex::new(file)) };
        let fmt_layer = fmt::layer().event_format(evt_fmt).with_writer(writer);
        tracing_subscriber::registry().with(fmt_layer).with(EnvFilter::from_default_env()).init();
    } else if immediate {
        let fmt_layer = fmt::layer().event_format(evt_fmt).with_writer(ImmediateStderr);
        tracing_subscriber::registry().with(fmt_layer).with(EnvFilter::from_default_env()).init();
    } else {
        let fmt_layer = fmt::layer().event_format(evt_fmt);
        tracing_subscriber::registry().with(fmt_layer).with(EnvFilter::from_default_env()).init();
    }
    Ok(())
}
