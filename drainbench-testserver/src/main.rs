use std::net::SocketAddr;

use drainbench_testserver::{LabServerOptions, LabServerStats};
use tokio::net::TcpListener;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut options = LabServerOptions::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--drain-per-report" => {
                let n = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--drain-per-report requires a number"))?;
                options.drain_per_report = n.parse()?;
            }
            "--no-heap-metrics" => options.heap_metrics = false,
            "-h" | "--help" => {
                eprintln!(
                    "drainbench-testserver\n\nUSAGE:\n  drainbench-testserver [--bind 127.0.0.1:0] [--drain-per-report N] [--no-heap-metrics]\n\nOUTPUT:\n  Prints BASE_URL=<url> to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let app = drainbench_testserver::router(options, LabServerStats::default());

    println!("BASE_URL=http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
