use std::io::Write;

use env_logger::{Builder, Target};
use log::LevelFilter;

/// Installs an `env_logger` writing `target - LEVEL: message` lines to
/// stdout. `RUST_LOG` still overrides `level`. Calling it again is a no-op.
pub fn configure_logging(level: LevelFilter) {
    let mut builder = Builder::new();
    builder
        .filter_level(level)
        .parse_default_env()
        .target(Target::Stdout)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {}: {}",
                record.target(),
                record.level(),
                record.args()
            )
        });

    if builder.try_init().is_ok() {
        log::debug!("Initialized basic logging");
    }
}
