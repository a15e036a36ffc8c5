use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

/// Log target of the status channel mirror; those lines already reach the
/// terminal through the status view.
const STATUS_TARGET: &str = "ohtanks_core::status";

fn level_for(debug_enabled: bool) -> LevelFilter {
    if debug_enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Console threshold: everything in debug builds, problems only otherwise.
fn terminal_level(debug_enabled: bool) -> LevelFilter {
    if cfg!(debug_assertions) {
        level_for(debug_enabled)
    } else {
        LevelFilter::Warn
    }
}

fn previous_log_path(log_path: &Path) -> PathBuf {
    let mut name = log_path.file_name().unwrap_or_default().to_os_string();
    name.push(".old");
    log_path.with_file_name(name)
}

/// Move an oversized log aside as `<name>.old`, replacing the previous one,
/// so each run starts writing a fresh file.
///
/// Returns whether the file was rotated.
fn rotate_if_oversized(log_path: &Path, max_log_size: u64) -> io::Result<bool> {
    let size = match std::fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };
    if size <= max_log_size {
        return Ok(false);
    }
    std::fs::rename(log_path, previous_log_path(log_path))?;
    Ok(true)
}

fn file_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("ohtanks")
        .build()
}

fn terminal_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("ohtanks")
        .add_filter_ignore_str(STATUS_TARGET)
        .build()
}

/// Install the global logger: a file log under the data directory plus
/// warnings on stderr.
///
/// Failures to prepare the log file are reported on stderr and leave only
/// the terminal logger active.
pub fn init_logging(log_path: &Path, debug_enabled: bool, max_log_size: u64) {
    if let Some(parent) = log_path.parent()
        && let Err(error) = std::fs::create_dir_all(parent)
    {
        eprintln!("Cannot create log directory {}: {error}", parent.display());
    }
    let rotated = rotate_if_oversized(log_path, max_log_size).unwrap_or_else(|error| {
        eprintln!("Cannot rotate log file {}: {error}", log_path.display());
        false
    });

    let level = level_for(debug_enabled);
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        terminal_level(debug_enabled),
        terminal_config(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(file) => loggers.push(WriteLogger::new(level, file_config(), file)),
        Err(error) => eprintln!("Cannot open log file {}: {error}", log_path.display()),
    }

    if CombinedLogger::init(loggers).is_err() {
        return;
    }
    log::set_max_level(level);
    if rotated {
        log::info!("Previous log moved to {}", previous_log_path(log_path).display());
    }
    log::debug!("Logging to {}", log_path.display());
}
