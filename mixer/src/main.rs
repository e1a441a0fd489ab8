use std::env;
use std::str::FromStr;

use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use tos_mixer::cli::{self, Cli};

/// `log_level` (trace/debug/info/warn/error, default info) and `log_dir`
/// (enables a `mixer.%Y-%m-%d.log` rolling file sink alongside stdout) are
/// read directly from the environment, ahead of `EnvSettings::from_env`, so
/// a malformed `EnvSettings` still gets logged through.
fn init_logging() {
    let level = env::var("log_level")
        .ok()
        .and_then(|s| log::LevelFilter::from_str(&s).ok())
        .unwrap_or(log::LevelFilter::Info);

    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    let mut dispatch = fern::Dispatch::new()
        .level(level)
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                colors.color(record.level()),
                message
            ))
        })
        .chain(std::io::stdout());

    if let Ok(log_dir) = env::var("log_dir") {
        dispatch = dispatch.chain(fern::DateBased::new(log_dir, "mixer.%Y-%m-%d.log"));
    }

    dispatch.apply().expect("logger already initialized");
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_logging();
    let cli = Cli::parse();
    let code = cli::run(cli).await;
    std::process::ExitCode::from(code as u8)
}
