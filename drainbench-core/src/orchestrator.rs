use crate::aggregate::RunResult;
use crate::client::{HeapMetrics, LabControl};
use crate::plan::{Mode, RunPlan};
use crate::poll::CompletionPoller;
use crate::report::StatusReport;
use crate::sampler::{HeapSampler, SampleSummary};
use crate::Result;

/// Receives each [`RunResult`] as soon as its iteration is recorded.
pub trait ResultSink {
    fn record(&mut self, result: &RunResult) -> std::io::Result<()>;
}

impl ResultSink for Vec<RunResult> {
    fn record(&mut self, result: &RunResult) -> std::io::Result<()> {
        self.push(result.clone());
        Ok(())
    }
}

/// Drives the experiment matrix one iteration at a time.
///
/// Per iteration: reset, start the sampler (if enabled), seed, dispatch, poll
/// until drained, stop the sampler, record. The first failure aborts the
/// whole matrix; results already handed to the sink stay recorded.
#[derive(Debug)]
pub struct Orchestrator<'a, C> {
    plan: &'a RunPlan,
    client: C,
    poller: CompletionPoller,
}

impl<'a, C> Orchestrator<'a, C>
where
    C: LabControl + HeapMetrics,
{
    pub fn new(plan: &'a RunPlan, client: C) -> Self {
        Self {
            plan,
            client,
            poller: CompletionPoller::from_plan(plan),
        }
    }

    pub async fn run_matrix<S>(&self, sink: &mut S) -> Result<Vec<RunResult>>
    where
        S: ResultSink + ?Sized,
    {
        let total = self.plan.total_iterations();
        let mut results = Vec::with_capacity(total);

        for (idx, (items, mode, run)) in self.plan.iterations().enumerate() {
            tracing::info!(
                items,
                %mode,
                run = format_args!("{run}/{}", self.plan.runs),
                "iteration {}/{total}",
                idx + 1
            );

            let result = self.run_once(items, mode, run).await?;
            sink.record(&result)?;
            results.push(result);
        }

        Ok(results)
    }

    pub async fn run_once(&self, items: u64, mode: Mode, run: u32) -> Result<RunResult> {
        self.client.reset().await?;

        // Started before seeding so seeding-phase heap pressure is captured.
        let mut sampler = self
            .plan
            .sample_heap
            .then(|| HeapSampler::start(self.client.clone(), self.plan.sampler_interval));

        let outcome = self.seed_and_drain(items, mode).await;

        let memory = match sampler.as_mut() {
            Some(sampler) => Some(self.finish_sampler(sampler).await),
            None => None,
        };

        let report = outcome?;
        if let Some(summary) = &memory {
            tracing::debug!(samples = summary.samples, "heap samples collected");
        }

        Ok(RunResult {
            items,
            mode,
            run,
            report,
            memory,
        })
    }

    async fn seed_and_drain(&self, items: u64, mode: Mode) -> Result<StatusReport> {
        self.client.seed(items).await?;
        self.client.dispatch(mode).await?;
        self.poller.wait(&self.client).await
    }

    async fn finish_sampler(&self, sampler: &mut HeapSampler) -> SampleSummary {
        sampler.stop();
        sampler.join(self.plan.join_grace).await;
        sampler.stats()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::client::{HeapMetric, Phase, ReportSource};
    use crate::plan::{PlanInputs, Profile};
    use crate::Error;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// In-memory lab that drains one report after dispatch and logs every call.
    #[derive(Clone, Default)]
    struct FakeLab {
        calls: Arc<Mutex<Vec<String>>>,
        fail: Option<Phase>,
        samples: Arc<Mutex<u64>>,
    }

    impl FakeLab {
        fn failing(phase: Phase) -> Self {
            Self {
                fail: Some(phase),
                ..Self::default()
            }
        }

        fn log(&self, call: String, phase: Phase) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail == Some(phase) {
                return Err(Error::ControlRequest {
                    phase,
                    method: http::Method::POST,
                    url: "http://lab".to_string(),
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ReportSource for FakeLab {
        async fn report(&self) -> Result<StatusReport> {
            self.log("report".to_string(), Phase::Report)?;
            Ok(serde_json::from_value(json!({
                "pending": 0,
                "processing": 0,
                "retryScheduled": 0,
                "drainTimeMs": 100,
            }))
            .unwrap())
        }
    }

    impl LabControl for FakeLab {
        async fn reset(&self) -> Result<()> {
            self.log("reset".to_string(), Phase::Reset)
        }

        async fn seed(&self, items: u64) -> Result<()> {
            self.log(format!("seed {items}"), Phase::Seed)
        }

        async fn dispatch(&self, mode: Mode) -> Result<()> {
            self.log(format!("dispatch {mode}"), Phase::Dispatch)
        }
    }

    impl HeapMetrics for FakeLab {
        async fn heap_metric(&self, metric: HeapMetric) -> Result<Option<f64>> {
            if metric == HeapMetric::Used {
                *self.samples.lock().unwrap() += 1;
            }
            Ok(Some(64.0 * 1024.0 * 1024.0))
        }
    }

    fn plan(profile: Profile, items: &str, runs: i64) -> RunPlan {
        RunPlan::resolve(
            profile,
            &PlanInputs {
                base_url: "http://lab".to_string(),
                items_list: Some(items.to_string()),
                runs,
                poll_interval_ms: 10,
                timeout_ms: 1000,
                sampler_interval_ms: 5,
                ..PlanInputs::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn runs_phases_in_order_for_every_tuple() {
        let plan = plan(Profile::Flow, "100,250", 2);
        let lab = FakeLab::default();
        let orchestrator = Orchestrator::new(&plan, lab.clone());

        let mut sink: Vec<RunResult> = Vec::new();
        let results = orchestrator.run_matrix(&mut sink).await.unwrap();

        assert_eq!(results.len(), 8);
        assert_eq!(sink, results);
        assert!(results.iter().all(|r| r.memory.is_none()));

        let calls = lab.calls();
        assert_eq!(calls.len(), 8 * 4);
        assert_eq!(
            &calls[..4],
            &["reset", "seed 100", "dispatch async", "report"]
        );
        assert_eq!(
            &calls[calls.len() - 4..],
            &["reset", "seed 250", "dispatch sync", "report"]
        );
        assert_eq!(
            results.iter().map(|r| r.run).collect::<Vec<_>>(),
            vec![1, 2, 1, 2, 1, 2, 1, 2]
        );
    }

    #[tokio::test]
    async fn seed_failure_aborts_before_polling_and_records_nothing() {
        let plan = plan(Profile::Flow, "100", 1);
        let lab = FakeLab::failing(Phase::Seed);
        let orchestrator = Orchestrator::new(&plan, lab.clone());

        let mut sink: Vec<RunResult> = Vec::new();
        let err = orchestrator.run_matrix(&mut sink).await.unwrap_err();

        assert_eq!(err.phase(), Some(Phase::Seed));
        assert!(sink.is_empty());
        assert_eq!(lab.calls(), vec!["reset", "seed 100"]);
    }

    #[tokio::test]
    async fn reset_failure_never_seeds() {
        let plan = plan(Profile::Memory, "100", 1);
        let lab = FakeLab::failing(Phase::Reset);
        let orchestrator = Orchestrator::new(&plan, lab.clone());

        let err = orchestrator.run_once(100, Mode::Async, 1).await.unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Reset));
        assert_eq!(lab.calls(), vec!["reset"]);
        // The sampler only starts after a successful reset.
        assert_eq!(*lab.samples.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn dispatch_failure_still_stops_the_sampler() {
        let plan = plan(Profile::Memory, "100", 1);
        let lab = FakeLab::failing(Phase::Dispatch);
        let orchestrator = Orchestrator::new(&plan, lab.clone());

        let err = orchestrator
            .run_once(100, Mode::SyncAll, 1)
            .await
            .unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Dispatch));

        let after_failure = *lab.samples.lock().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*lab.samples.lock().unwrap(), after_failure);
    }

    #[tokio::test]
    async fn memory_profile_attaches_heap_summary() {
        let plan = plan(Profile::Memory, "100", 1);
        let lab = FakeLab::default();
        let orchestrator = Orchestrator::new(&plan, lab.clone());

        let mut sink: Vec<RunResult> = Vec::new();
        let results = orchestrator.run_matrix(&mut sink).await.unwrap();
        assert_eq!(results.len(), 4);

        for r in &results {
            let memory = r.memory.unwrap();
            assert!(memory.samples >= 1);
            assert_eq!(memory.heap_used_max_mb, 64.0);
            assert_eq!(r.record()["heap_used_p99_mb"], json!(64.0));
        }
    }
}
