mod environment;
mod failure;
mod report;

pub mod runner;

pub use environment::{Environment, detect_git_commit, detect_in_container, utc_now};
pub use failure::{ErrorKey, Failure, FailureKind, MSG_HASH_LEN, Outcome, msg_hash};
pub use report::{
    CpuDoc, ErrorEntry, INTERNAL_ERROR_NOTE, LatencyDoc, RepeatDoc, Report, ReportHeader,
    ResultsDoc, SummaryDoc, Workload, build_internal_error_report, build_report, error_entries,
    merge_errors, run_and_report, write_report,
};
pub use runner::{Error, Result};
