mod app;
mod headless;

use anyhow::{Context, Result};
use clap::Parser;
use retino_experiment::{ProgressReporter, ProtocolSession, RunConfig, RunRecord, RunRecorder};
use retino_timing::{CounterClock, FrameClock, FreeRunningClock, HighPrecisionTimer, NiDaqCounter};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use app::App;

#[derive(Parser, Debug)]
#[command(author, version, about = "Moving-bar retinotopic mapping stimulus")]
struct Cli {
    /// TOML run configuration; a commented template is written if it is missing
    #[arg(short, long, default_value = "retino.toml")]
    config: PathBuf,

    /// Subject identifier used in the log file names
    #[arg(long)]
    subject: Option<String>,

    /// Directory for the run log and snapshot
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Count imaging frames on the DAQ edge counter
    #[arg(long)]
    use_daq: bool,

    /// Rasterise off-screen instead of opening a fullscreen window
    #[arg(long)]
    headless: bool,

    /// Debug logging and periodic bar-position lines
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut RunConfig) {
        if let Some(subject) = &self.subject {
            config.session.subject_id = subject.clone();
        }
        if let Some(dir) = &self.save_dir {
            config.session.save_dir = Some(dir.clone());
        }
        if self.use_daq {
            config.hardware.use_daq = true;
        }
        if self.verbose {
            config.session.verbose = true;
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// The hardware counter when requested, otherwise the free-running clock.
/// A counter that cannot be opened stops the program before any frame is drawn.
fn open_clock(config: &RunConfig) -> Result<Box<dyn FrameClock>> {
    if config.hardware.use_daq {
        let port = &config.hardware.counter_port;
        let device = NiDaqCounter::open(port)
            .with_context(|| format!("opening frame counter on {port}"))?;
        info!(port = %port, "frame counter opened");
        return Ok(Box::new(CounterClock::new(device)));
    }
    Ok(Box::new(FreeRunningClock::new(
        HighPrecisionTimer::new(),
        config.hardware.sample_rate,
    )))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = RunConfig::load_or_default(&cli.config)?;
    cli.apply(&mut config);
    config.validate()?;

    let session = ProtocolSession::from_config(&config)?;
    let progress = ProgressReporter::from_config(&config);
    let clock = open_clock(&config)?;

    let state = if cli.headless {
        headless::run(&config, &session, clock, progress)?
    } else {
        App::new(&config, &session, clock, progress).run()?
    };

    let record = RunRecord::capture(&config, &session, &state, chrono::Local::now().naive_local());
    record.log_summary();
    RunRecorder::new(config.session.save_dir.clone()).persist(&record)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "retino",
            "--subject",
            "M77",
            "--save-dir",
            "/tmp/rm",
            "--use-daq",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("retino.toml"));
        assert!(!cli.headless);

        let mut config = RunConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.session.subject_id, "M77");
        assert_eq!(config.session.save_dir, Some(PathBuf::from("/tmp/rm")));
        assert!(config.hardware.use_daq);
        assert!(config.session.verbose);
    }

    #[test]
    fn absent_flags_keep_config() {
        let cli = Cli::try_parse_from(["retino", "-c", "lab.toml", "--headless"]).unwrap();
        let mut config = RunConfig::default();
        config.hardware.use_daq = true;
        cli.apply(&mut config);
        assert!(cli.headless);
        assert!(config.hardware.use_daq);
        assert_eq!(config.session.subject_id, RunConfig::default().session.subject_id);
    }
}
