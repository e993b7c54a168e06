use colored::Colorize;
use env_logger::{Builder, Target};
use log::{Level, LevelFilter};
use std::io::Write;

/// Install the binary's logger on stderr. Library code only uses the `log` macros.
///
/// Our crate logs at Info (Debug with `verbose`), dependencies at Warn. With `json` the
/// progress stream owns stdout, so our crate drops to Warn unless `verbose` is set.
pub fn setup_logging(verbose: bool, json: bool) {
    let level = match (verbose, json) {
        (true, _) => LevelFilter::Debug,
        (false, true) => LevelFilter::Warn,
        (false, false) => LevelFilter::Info,
    };
    let name = env!("CARGO_PKG_NAME");

    let _ = Builder::from_default_env()
        .target(Target::Stderr)
        .filter_level(LevelFilter::Warn)
        .filter_module(name, level)
        .format(move |buf, record| {
            let tag = name.cyan();
            match record.level() {
                Level::Error => writeln!(buf, "[{} {}] {}", tag, "ERROR".red(), record.args()),
                Level::Warn => writeln!(buf, "[{} {}] {}", tag, "WARN".yellow(), record.args()),
                Level::Info => writeln!(buf, "[{}] {}", tag, record.args()),
                Level::Debug | Level::Trace => writeln!(
                    buf,
                    "[{} {}] {}",
                    tag,
                    record.target().dimmed(),
                    record.args().to_string().dimmed()
                ),
            }
        })
        .try_init();
}
