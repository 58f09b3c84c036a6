use anyhow::Context as _;

use drainbench_core::{ControlClient, Orchestrator, Profile, RunPlan, summarize_runs};

use crate::cli::BenchArgs;
use crate::exit_codes::ExitCode;
use crate::output::OutputPaths;
use crate::output::detail::DetailWriter;
use crate::output::summary;
use crate::run_error::RunError;

pub async fn run(profile: Profile, args: BenchArgs) -> Result<ExitCode, RunError> {
    // Nothing touches the filesystem or the network until the plan is valid.
    let plan = RunPlan::resolve(profile, &args.plan_inputs())?;

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create output dir: {}",
                args.output_dir.display()
            )
        })
        .map_err(RunError::RuntimeError)?;

    let paths = OutputPaths::allocate(&args.output_dir, profile);
    let mut detail = DetailWriter::create(&paths.detail, profile, plan.sample_heap)
        .with_context(|| format!("failed to create {}", paths.detail.display()))
        .map_err(RunError::RuntimeError)?;

    tracing::info!(
        %profile,
        base_url = %plan.base_url,
        items = ?plan.items,
        modes = ?plan.modes.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        runs = plan.runs,
        sample_heap = plan.sample_heap,
        "starting {} iterations",
        plan.total_iterations()
    );

    let orchestrator = Orchestrator::new(&plan, ControlClient::new(&plan));
    let results = match orchestrator.run_matrix(&mut detail).await {
        Ok(results) => results,
        Err(err) => {
            tracing::warn!(
                path = %paths.detail.display(),
                "run aborted; completed rows kept in the detail file"
            );
            return Err(err.into());
        }
    };

    let rows = summarize_runs(&results);
    summary::write_file(&paths.summary, &rows)
        .with_context(|| format!("failed to write {}", paths.summary.display()))
        .map_err(RunError::RuntimeError)?;

    println!("detail: {}", paths.detail.display());
    println!("summary: {}", paths.summary.display());

    Ok(ExitCode::Success)
}
