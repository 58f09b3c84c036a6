use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use http_body_util::{BodyExt as _, Empty};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;

use crate::plan::{Mode, RunPlan};
use crate::report::{Fields, StatusReport};
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Control request that drives one iteration, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Reset,
    Seed,
    Dispatch,
    Report,
}

/// Heap gauges exposed by the target's actuator endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum HeapMetric {
    #[strum(serialize = "jvm.memory.used")]
    Used,
    #[strum(serialize = "jvm.memory.max")]
    Max,
    #[strum(serialize = "jvm.memory.committed")]
    Committed,
}

impl HeapMetric {
    pub const ALL: [Self; 3] = [Self::Used, Self::Max, Self::Committed];

    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Anything that can produce a fresh [`StatusReport`].
pub trait ReportSource {
    fn report(&self) -> impl Future<Output = Result<StatusReport>> + Send;
}

/// The lab service control surface.
pub trait LabControl: ReportSource {
    fn reset(&self) -> impl Future<Output = Result<()>> + Send;
    fn seed(&self, items: u64) -> impl Future<Output = Result<()>> + Send;
    fn dispatch(&self, mode: Mode) -> impl Future<Output = Result<()>> + Send;
}

/// Source of heap samples. `Ok(None)` means "no sample this tick".
pub trait HeapMetrics: Clone + Send + Sync + 'static {
    fn heap_metric(&self, metric: HeapMetric) -> impl Future<Output = Result<Option<f64>>> + Send;
}

#[derive(Debug)]
struct RawResponse {
    status: u16,
    body: Bytes,
}

impl RawResponse {
    fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Deserialize)]
struct MetricResponse {
    #[serde(default)]
    measurements: Vec<Measurement>,
}

#[derive(Debug, Deserialize)]
struct Measurement {
    value: Option<f64>,
}

/// HTTP client for the lab service's control and metrics endpoints.
#[derive(Debug, Clone)]
pub struct ControlClient {
    inner: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    base_url: Arc<str>,
    control_timeout: Duration,
    metric_timeout: Duration,
}

impl ControlClient {
    #[must_use]
    pub fn new(plan: &RunPlan) -> Self {
        Self::with_timeouts(&plan.base_url, plan.control_timeout, plan.metric_timeout)
    }

    #[must_use]
    pub fn with_timeouts(base_url: &str, control_timeout: Duration, metric_timeout: Duration) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(Some(CONNECT_TIMEOUT));

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self {
            inner,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            control_timeout,
            metric_timeout,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, method: Method, url: &str, timeout: Duration) -> Result<RawResponse> {
        let uri: hyper::Uri = url.parse().map_err(|_| Error::InvalidUrl(url.to_string()))?;
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Empty::<Bytes>::new())?;

        // The deadline covers the body as well as the response head.
        let fetch = async {
            let res = self.inner.request(req).await?;
            let status = res.status().as_u16();
            let body = res.into_body().collect().await?.to_bytes();
            Ok::<_, Error>(RawResponse { status, body })
        };

        match tokio::time::timeout(timeout, fetch).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    /// Issues a control request; any non-2xx status is fatal for the run.
    async fn control(&self, phase: Phase, path: &str) -> Result<()> {
        let url = self.url(path);
        let res = self
            .send(Method::POST, &url, self.control_timeout)
            .await?;
        if !(200..300).contains(&res.status) {
            return Err(Error::ControlRequest {
                phase,
                method: Method::POST,
                url,
                status: res.status,
                body: res.body_lossy(),
            });
        }
        tracing::debug!(%phase, status = res.status, %url, "control request ok");
        Ok(())
    }
}

impl ReportSource for ControlClient {
    async fn report(&self) -> Result<StatusReport> {
        let url = self.url("/lab/report");
        let res = self.send(Method::GET, &url, self.control_timeout).await?;
        if res.status != 200 {
            return Err(Error::ControlRequest {
                phase: Phase::Report,
                method: Method::GET,
                url,
                status: res.status,
                body: res.body_lossy(),
            });
        }

        match serde_json::from_slice::<Fields>(&res.body) {
            Ok(fields) => Ok(StatusReport::new(fields)),
            Err(_) => Err(Error::InvalidReport {
                body: res.body_lossy(),
                url,
            }),
        }
    }
}

impl LabControl for ControlClient {
    async fn reset(&self) -> Result<()> {
        self.control(Phase::Reset, "/lab/report/reset").await
    }

    async fn seed(&self, items: u64) -> Result<()> {
        self.control(Phase::Seed, &format!("/lab/seed?items={items}"))
            .await
    }

    async fn dispatch(&self, mode: Mode) -> Result<()> {
        self.control(Phase::Dispatch, mode.dispatch_path()).await
    }
}

impl HeapMetrics for ControlClient {
    async fn heap_metric(&self, metric: HeapMetric) -> Result<Option<f64>> {
        let url = self.url(&format!("/actuator/metrics/{}?tag=area:heap", metric.name()));
        let res = self.send(Method::GET, &url, self.metric_timeout).await?;
        if !(200..300).contains(&res.status) {
            return Ok(None);
        }

        let value = serde_json::from_slice::<MetricResponse>(&res.body)
            .ok()
            .and_then(|m| m.measurements.into_iter().next())
            .and_then(|m| m.value);
        Ok(value)
    }
}
