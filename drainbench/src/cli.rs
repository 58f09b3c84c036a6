use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use drainbench_core::{
    DEFAULT_BASE_URL, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RUNS, DEFAULT_SAMPLER_INTERVAL_MS,
    DEFAULT_TIMEOUT_MS, PlanInputs, Profile,
};

pub const DEFAULT_OUTPUT_DIR: &str = "results";

#[derive(Debug, Parser)]
#[command(
    name = "drainbench",
    author,
    version,
    about = "Drain-time and heap benchmarks for a job-queue lab service",
    long_about = "drainbench drives a lab service through reset, seed, dispatch and drain for every (workload size, dispatch mode, repetition) tuple, and writes one CSV row per run plus a per-(size, mode) summary.\n\nEvery flag can also be set through the environment variable shown in its help.",
    after_help = "Examples:\n  drainbench flow\n  drainbench flow --items-list 100,1000 --runs 5\n  ITEMS_START=100 ITEMS_END=1000 ITEMS_STEP=300 drainbench memory\n  drainbench memory --modes async,sync-all --output-dir out"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compare async vs sync drain time
    Flow(BenchArgs),

    /// Compare heap usage across all four dispatch modes
    #[command(
        long_about = "Run every dispatch mode while a background task samples the target's heap metrics, and attach min/max/avg/p95/p99 statistics to each run."
    )]
    Memory(BenchArgs),
}

impl Command {
    #[must_use]
    pub fn profile(&self) -> Profile {
        match self {
            Self::Flow(_) => Profile::Flow,
            Self::Memory(_) => Profile::Memory,
        }
    }

    #[must_use]
    pub fn into_args(self) -> BenchArgs {
        match self {
            Self::Flow(args) | Self::Memory(args) => args,
        }
    }
}

#[derive(Debug, Args)]
pub struct BenchArgs {
    /// Base URL of the lab service
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Comma-separated workload sizes (ignored when ITEMS_START and ITEMS_END are set)
    #[arg(long, env = "ITEMS_LIST", value_name = "N,N,...")]
    pub items_list: Option<String>,

    /// First workload size of an inclusive range
    #[arg(long, env = "ITEMS_START", allow_negative_numbers = true)]
    pub items_start: Option<i64>,

    /// Last workload size of an inclusive range
    #[arg(long, env = "ITEMS_END", allow_negative_numbers = true)]
    pub items_end: Option<i64>,

    /// Range step (default 100)
    #[arg(long, env = "ITEMS_STEP", allow_negative_numbers = true)]
    pub items_step: Option<i64>,

    /// Comma-separated dispatch modes (async, async-all, sync, sync-all)
    #[arg(long, env = "MODES")]
    pub modes: Option<String>,

    /// Repetitions per (size, mode)
    #[arg(long, env = "RUNS", default_value_t = DEFAULT_RUNS, allow_negative_numbers = true)]
    pub runs: i64,

    /// Delay between status report fetches
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS, allow_negative_numbers = true)]
    pub poll_interval_ms: i64,

    /// Give up waiting for a drain after this long
    #[arg(long, env = "TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS, allow_negative_numbers = true)]
    pub timeout_ms: i64,

    /// Delay between heap sampling ticks
    #[arg(long, env = "MEMORY_POLL_MS", default_value_t = DEFAULT_SAMPLER_INTERVAL_MS, allow_negative_numbers = true)]
    pub memory_poll_ms: i64,

    /// Directory the CSV files are written to (created if missing)
    #[arg(long, env = "OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Sample heap metrics even for profiles that do not by default
    #[arg(long, overrides_with = "no_sampler")]
    pub sampler: bool,

    /// Disable heap sampling
    #[arg(long, overrides_with = "sampler")]
    pub no_sampler: bool,
}

impl BenchArgs {
    #[must_use]
    pub fn plan_inputs(&self) -> PlanInputs {
        PlanInputs {
            base_url: self.base_url.clone(),
            items_list: self.items_list.clone(),
            items_start: self.items_start,
            items_end: self.items_end,
            items_step: self.items_step,
            modes: self.modes.clone(),
            runs: self.runs,
            poll_interval_ms: self.poll_interval_ms,
            timeout_ms: self.timeout_ms,
            sampler_interval_ms: self.memory_poll_ms,
            sample_heap: self.sample_heap(),
        }
    }

    fn sample_heap(&self) -> Option<bool> {
        if self.no_sampler {
            Some(false)
        } else if self.sampler {
            Some(true)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        match Cli::try_parse_from(args) {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    #[test]
    fn cli_parses_flow_with_explicit_flags() {
        let cli = parse(&[
            "drainbench",
            "flow",
            "--base-url",
            "http://lab:9000",
            "--items-list",
            "10,20",
            "--runs",
            "2",
            "--poll-interval-ms",
            "50",
            "--timeout-ms",
            "1000",
            "--output-dir",
            "out",
        ]);

        assert_eq!(cli.command.profile(), Profile::Flow);
        let args = cli.command.into_args();
        assert_eq!(args.base_url, "http://lab:9000");
        assert_eq!(args.items_list.as_deref(), Some("10,20"));
        assert_eq!(args.runs, 2);
        assert_eq!(args.poll_interval_ms, 50);
        assert_eq!(args.timeout_ms, 1000);
        assert_eq!(args.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn cli_parses_memory_range_and_modes() {
        let cli = parse(&[
            "drainbench",
            "memory",
            "--items-start",
            "100",
            "--items-end",
            "300",
            "--items-step",
            "100",
            "--modes",
            "async,sync-all",
            "--memory-poll-ms",
            "250",
        ]);

        assert_eq!(cli.command.profile(), Profile::Memory);
        let inputs = cli.command.into_args().plan_inputs();
        assert_eq!(inputs.items_start, Some(100));
        assert_eq!(inputs.items_end, Some(300));
        assert_eq!(inputs.items_step, Some(100));
        assert_eq!(inputs.modes.as_deref(), Some("async,sync-all"));
        assert_eq!(inputs.sampler_interval_ms, 250);
    }

    #[test]
    fn sampler_flags_override_each_other() {
        let args = parse(&["drainbench", "memory", "--no-sampler"])
            .command
            .into_args();
        assert_eq!(args.plan_inputs().sample_heap, Some(false));

        let args = parse(&["drainbench", "flow", "--sampler"])
            .command
            .into_args();
        assert_eq!(args.plan_inputs().sample_heap, Some(true));

        let args = parse(&["drainbench", "flow", "--no-sampler", "--sampler"])
            .command
            .into_args();
        assert_eq!(args.plan_inputs().sample_heap, Some(true));
    }

    #[test]
    fn negative_runs_reach_plan_validation() {
        let args = parse(&["drainbench", "flow", "--runs", "-1"])
            .command
            .into_args();
        assert_eq!(args.runs, -1);
    }

    #[test]
    fn non_numeric_runs_is_a_parse_error() {
        assert!(Cli::try_parse_from(["drainbench", "flow", "--runs", "three"]).is_err());
    }
}
