use std::io::Write as _;

use anyhow::Context as _;
use hsbench_core::runner::SysinfoCpu;
use hsbench_core::{run_and_report, write_report};
use hsbench_exchange::{MockExchange, Profile};

use crate::cli::Cli;
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;

pub fn run(args: Cli) -> Result<ExitCode, RunError> {
    let profile = Profile::load(&args.profile)
        .with_context(|| format!("failed to load profile: {}", args.profile.display()))
        .map_err(RunError::InvalidInput)?;

    let cfg = args.run_config();
    cfg.validate()
        .context("invalid run configuration")
        .map_err(RunError::InvalidInput)?;

    tracing::info!(
        profile = %profile.name,
        mode = %profile.mode(),
        metadata = ?profile.metadata,
        concurrency = cfg.concurrency,
        duration_s = cfg.duration.as_secs_f64(),
        warmup_s = cfg.warmup.as_secs_f64(),
        repeats = cfg.repeats,
        "starting benchmark"
    );

    let header = profile.report_header(&args.profile);
    let op = MockExchange::from_profile(&profile);
    let report = run_and_report(&header, &cfg, &op, &SysinfoCpu)
        .context("invalid run configuration")
        .map_err(RunError::InvalidInput)?;

    let json = report
        .to_json_pretty()
        .context("failed to serialize report")
        .map_err(RunError::Output)?;

    write_report(&args.out, &json)
        .with_context(|| format!("failed to write report: {}", args.out.display()))
        .map_err(RunError::Output)?;
    tracing::info!(path = %args.out.display(), "report written");

    if !args.quiet {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(json.as_bytes())
            .and_then(|()| stdout.flush())
            .context("failed to echo report to stdout")
            .map_err(RunError::Output)?;
    }

    Ok(ExitCode::Success)
}
