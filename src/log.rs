use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::fs::File;
use std::path::Path;

/// Install the global logger.
///
/// Filters come from `RUST_LOG` unless `level` is set. With `log_file` all records go to that
/// file, otherwise to stderr.
pub fn init(level: Option<LevelFilter>, log_file: Option<&Path>) -> std::io::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("warn"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    if let Some(path) = log_file {
        builder.target(Target::Pipe(Box::new(File::create(path)?)));
        builder.write_style(env_logger::WriteStyle::Never);
    }
    builder.format_timestamp_millis().init();
    Ok(())
}
