use std::path::Path;
use std::process::{Command, Output};

use anyhow::Context as _;
use drainbench_testserver::{FailPoint, LabServer, LabServerOptions};

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn ensure_code(out: &Output, expected: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == expected,
        "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

fn drainbench(profile: &str, base_url: &str, output_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_drainbench"));
    cmd.arg(profile)
        .env("BASE_URL", base_url)
        .env("ITEMS_LIST", "100")
        .env("RUNS", "1")
        .env("POLL_INTERVAL_MS", "5")
        .env("TIMEOUT_MS", "10000")
        .env("MEMORY_POLL_MS", "5")
        .env("OUTPUT_DIR", output_dir)
        .env_remove("ITEMS_START")
        .env_remove("ITEMS_END")
        .env_remove("ITEMS_STEP")
        .env_remove("MODES");
    cmd
}

async fn output(mut cmd: Command) -> anyhow::Result<Output> {
    tokio::task::spawn_blocking(move || cmd.output())
        .await
        .context("spawn_blocking join")?
        .context("run drainbench binary")
}

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let out = Command::new(env!("CARGO_BIN_EXE_drainbench"))
        .arg("flow")
        .arg("--runs")
        .arg("three")
        .output()
        .context("run drainbench binary")?;

    ensure_code(&out, 30)
}

#[test]
fn zero_runs_exit_30_before_creating_output_dir() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let out_dir = tmp.path().join("results");

    let mut cmd = drainbench("flow", "http://127.0.0.1:9", &out_dir);
    let out = cmd.env("RUNS", "0").output().context("run drainbench binary")?;

    ensure_code(&out, 30)?;
    anyhow::ensure!(!out_dir.exists(), "output dir must not be created");
    anyhow::ensure!(
        String::from_utf8_lossy(&out.stderr).contains("RUNS must be > 0"),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

#[test]
fn flow_profile_rejects_memory_only_modes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let out_dir = tmp.path().join("results");

    let mut cmd = drainbench("flow", "http://127.0.0.1:9", &out_dir);
    let out = cmd
        .env("MODES", "async,sync-all")
        .output()
        .context("run drainbench binary")?;

    ensure_code(&out, 30)?;
    anyhow::ensure!(!out_dir.exists(), "output dir must not be created");
    Ok(())
}

#[tokio::test]
async fn seed_failure_exit_41_without_summary() -> anyhow::Result<()> {
    let server = LabServer::start_with(LabServerOptions {
        fail_on: Some(FailPoint::Seed),
        ..LabServerOptions::default()
    })
    .await
    .context("start lab server")?;
    let tmp = tempfile::tempdir()?;
    let out_dir = tmp.path().join("results");

    let out = output(drainbench("flow", server.base_url(), &out_dir)).await?;
    server.shutdown().await;

    ensure_code(&out, 41)?;
    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(stderr.contains("seed request failed"), "stderr:\n{stderr}");
    anyhow::ensure!(stderr.contains("status=500"), "stderr:\n{stderr}");

    let mut details = 0;
    for entry in std::fs::read_dir(&out_dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        anyhow::ensure!(!name.contains("summary"), "summary written on failure: {name}");
        let text = std::fs::read_to_string(out_dir.join(&name))?;
        anyhow::ensure!(text.lines().count() == 1, "expected header only:\n{text}");
        details += 1;
    }
    anyhow::ensure!(details == 1, "expected one detail file, found {details}");
    Ok(())
}

#[tokio::test]
async fn drain_timeout_exit_42() -> anyhow::Result<()> {
    let server = LabServer::start_with(LabServerOptions {
        drain_per_report: 0,
        ..LabServerOptions::default()
    })
    .await
    .context("start lab server")?;
    let tmp = tempfile::tempdir()?;

    let mut cmd = drainbench("flow", server.base_url(), tmp.path());
    cmd.env("TIMEOUT_MS", "100");
    let out = output(cmd).await?;
    server.shutdown().await;

    ensure_code(&out, 42)?;
    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(
        stderr.contains("timeout waiting for completion"),
        "stderr:\n{stderr}"
    );
    Ok(())
}
