// Debug logging for heartlink
// The TUI owns the terminal, so tracing output goes to a file when --debug is passed

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::SystemTime;

use tracing_subscriber::EnvFilter;

pub const LOG_FILE_PATH: &str = "/tmp/heartlink-debug.log";

/// Install the file subscriber
///
/// With `enabled == false` nothing is installed and every `tracing` macro is a no-op.
/// `RUST_LOG` overrides the default `heartlink=debug` filter.
pub fn init(enabled: bool) -> io::Result<()> {
    if !enabled {
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(LOG_FILE_PATH)?;

    writeln!(file, "=== heartlink debug log ===")?;
    writeln!(file, "Session started: {:?}", SystemTime::now())?;
    writeln!(file, "To monitor: tail -f {}", LOG_FILE_PATH)?;
    writeln!(file, "===========================\n")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("heartlink=debug,str0m=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))
}
