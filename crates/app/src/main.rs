use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use meteor_summary_core::{
    select_eligible, validate::find_stack_image, ArchiveScanner, DatePolicy, DryRunPublisher,
    FfmpegTool, Pipeline, PipelineConfig, Publisher, RunOutcome, Stage, Validation,
    YouTubePublisher,
};
use tracing_subscriber::EnvFilter;

/// Exit status when the run found nothing to publish.
const NOTHING_TO_DO: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            common,
            dry_run,
            date,
        } => run(&common, dry_run, date),
        Commands::Scan { common } => scan(&common),
    }
}

fn run(common: &CommonArgs, dry_run: bool, date: Option<NaiveDate>) -> ExitCode {
    let config = match load_config(common, |config| {
        config.publish.dry_run |= dry_run;
        if let Some(date) = date {
            config.archive.date_policy = DatePolicy::Exact { date };
        }
    }) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(stage = %Stage::Setup, error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let Some(media) = media_tool() else {
        return ExitCode::FAILURE;
    };

    let publisher: Box<dyn Publisher> = if config.publish.dry_run {
        Box::new(DryRunPublisher)
    } else {
        match YouTubePublisher::from_env(&config.publish.access_token_env) {
            Ok(publisher) => Box::new(publisher),
            Err(e) => {
                tracing::error!(stage = %Stage::Publish, error = %e, "cannot set up publisher");
                return ExitCode::FAILURE;
            }
        }
    };

    let today = chrono::Local::now().date_naive();
    match Pipeline::new(&config, &media, publisher.as_ref(), today).run() {
        Ok(RunOutcome::Published(report)) => {
            tracing::info!(
                folder = %report.folder,
                meteors = report.meteor_count,
                duration = report.artifact_duration,
                video_id = report.remote_id.as_deref().unwrap_or("-"),
                dry_run = report.dry_run,
                "summary published"
            );
            if let Some(path) = &report.retained {
                tracing::info!(path = %path.display(), "artifact kept");
            }
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::NothingToPublish(reason)) => {
            tracing::info!(%reason, "nothing to do");
            ExitCode::from(NOTHING_TO_DO)
        }
        Err(failure) => {
            tracing::error!(stage = %failure.stage, error = %failure.error, "run failed");
            ExitCode::FAILURE
        }
    }
}

/// Prints every session per night, best ranked first, marking with `*` the
/// one a run would publish.
fn scan(common: &CommonArgs) -> ExitCode {
    let config = match load_config(common, |_| {}) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(stage = %Stage::Setup, error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let Some(media) = media_tool() else {
        return ExitCode::FAILURE;
    };

    let selected = ArchiveScanner::new(&config.archive).and_then(|scanner| scanner.select_all(&media));
    let selected = match selected {
        Ok(selected) => selected,
        Err(e) => {
            tracing::error!(stage = %Stage::Scan, error = %e, "scan failed");
            return ExitCode::FAILURE;
        }
    };
    if selected.is_empty() {
        println!("no sessions under {}", config.archive.root.display());
        return ExitCode::from(NOTHING_TO_DO);
    }

    for (date, candidates) in selected {
        let chosen = match select_eligible(date, candidates.clone()) {
            Ok(Validation::Eligible(valid)) => Some(valid.session.folder_name),
            _ => None,
        };
        for session in candidates {
            let duration = session
                .timelapse_duration
                .map(|secs| format!("{secs:.1}s"))
                .unwrap_or_else(|| "unprobed".to_string());
            let meteors = find_stack_image(&session.folder)
                .map(|(count, _)| count.to_string())
                .unwrap_or_else(|| "-".to_string());
            let mark = if chosen.as_deref() == Some(session.folder_name.as_str()) {
                '*'
            } else {
                ' '
            };
            println!(
                "{mark} {date}  {:<32}  timelapse {duration:>9}  meteors {meteors}",
                session.folder_name
            );
        }
    }
    ExitCode::SUCCESS
}

fn load_config(
    common: &CommonArgs,
    overrides: impl FnOnce(&mut PipelineConfig),
) -> meteor_summary_core::Result<PipelineConfig> {
    let mut config = match &common.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(archive) = &common.archive {
        config.archive.root = archive.clone();
    }
    overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn media_tool() -> Option<FfmpegTool> {
    let media = FfmpegTool::default();
    match media.detect() {
        Ok(version) => {
            tracing::debug!(%version, "ffmpeg available");
            Some(media)
        }
        Err(e) => {
            tracing::error!(stage = %Stage::Setup, error = %e, "ffmpeg is not available");
            None
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .try_init();
}

fn parse_night(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|e| format!("expected a date as YYYYMMDD: {e}"))
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Nightly meteor camera summary publisher", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Archive root holding one folder per session.
    #[arg(short, long)]
    archive: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build and publish the summary video for the target night.
    Run {
        #[command(flatten)]
        common: CommonArgs,
        /// Do everything except the upload.
        #[arg(long)]
        dry_run: bool,
        /// Publish this night (YYYYMMDD) instead of following the date policy.
        #[arg(long, value_parser = parse_night)]
        date: Option<NaiveDate>,
    },
    /// List every session per night and mark the one a run would publish.
    Scan {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_run_flags() {
        let cli = Cli::parse_from([
            "meteor-summary",
            "run",
            "--dry-run",
            "--date",
            "20250928",
            "--archive",
            "/tmp/archive",
            "-v",
        ]);
        assert!(cli.verbose);
        let Commands::Run {
            common,
            dry_run,
            date,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert!(dry_run);
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 9, 28));
        assert_eq!(common.archive, Some(PathBuf::from("/tmp/archive")));
    }

    #[test]
    fn malformed_dates_are_refused() {
        assert!(parse_night("2025-09-28").is_err());
        assert!(parse_night("20251332").is_err());
    }

    #[test]
    fn overrides_apply_before_validation() {
        let common = CommonArgs {
            config: None,
            archive: Some(PathBuf::from("/data/archive")),
        };
        let date = NaiveDate::from_ymd_opt(2025, 9, 28).unwrap();
        let config = load_config(&common, |config| {
            config.archive.date_policy = DatePolicy::Exact { date };
        })
        .unwrap();

        assert_eq!(config.archive.root, PathBuf::from("/data/archive"));
        assert_eq!(config.archive.date_policy, DatePolicy::Exact { date });
    }
}
