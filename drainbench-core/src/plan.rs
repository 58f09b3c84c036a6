use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8070";
pub const DEFAULT_ITEMS_LIST: &str = "100,250,500";
pub const DEFAULT_ITEMS_STEP: i64 = 100;
pub const DEFAULT_RUNS: i64 = 3;
pub const DEFAULT_POLL_INTERVAL_MS: i64 = 1000;
pub const DEFAULT_TIMEOUT_MS: i64 = 600_000;
pub const DEFAULT_SAMPLER_INTERVAL_MS: i64 = 500;

const DEFAULT_JOIN_GRACE: Duration = Duration::from_secs(2);
const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_METRIC_TIMEOUT: Duration = Duration::from_secs(3);

/// Dispatch strategy under test.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Mode {
    Async,
    AsyncAll,
    Sync,
    SyncAll,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Path (relative to the base URL) of the request that triggers this mode.
    #[must_use]
    pub fn dispatch_path(self) -> &'static str {
        match self {
            Self::Async => "/lab/run",
            Self::AsyncAll => "/lab/run-all",
            Self::Sync => "/lab/run-sync",
            Self::SyncAll => "/lab/run-sync-all",
        }
    }
}

/// Which benchmark matrix is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Profile {
    /// async vs sync drain comparison, no heap sampling.
    Flow,
    /// All four dispatch modes with heap sampling.
    Memory,
}

impl Profile {
    #[must_use]
    pub fn default_modes(self) -> &'static [Mode] {
        match self {
            Self::Flow => &[Mode::Async, Mode::Sync],
            Self::Memory => &[Mode::Async, Mode::AsyncAll, Mode::Sync, Mode::SyncAll],
        }
    }

    #[must_use]
    pub fn allows(self, mode: Mode) -> bool {
        match self {
            Self::Flow => matches!(mode, Mode::Async | Mode::Sync),
            Self::Memory => true,
        }
    }

    #[must_use]
    pub fn samples_heap(self) -> bool {
        matches!(self, Self::Memory)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid BASE_URL `{0}` (expected an http:// or https:// URL)")]
    InvalidBaseUrl(String),

    #[error("ITEMS_LIST must be comma-separated integers (got {0})")]
    InvalidItem(String),

    #[error("ITEMS_LIST must contain at least one value")]
    EmptyItems,

    #[error("workload sizes must be positive (got {0})")]
    NonPositiveItems(i64),

    #[error("ITEMS_STEP must be > 0")]
    InvalidStep,

    #[error("ITEMS_END must be >= ITEMS_START")]
    InvalidRange,

    #[error("RUNS must be > 0")]
    InvalidRuns,

    #[error("{0} must be > 0")]
    NonPositiveInterval(&'static str),

    #[error("unsupported mode: {0}")]
    UnknownMode(String),

    #[error("mode `{mode}` is not available in the `{profile}` profile")]
    ModeNotAllowed { mode: Mode, profile: Profile },

    #[error("MODES must contain at least one mode")]
    EmptyModes,
}

/// Raw, unvalidated run settings as they arrive from flags or the environment.
#[derive(Debug, Clone)]
pub struct PlanInputs {
    pub base_url: String,
    pub items_list: Option<String>,
    pub items_start: Option<i64>,
    pub items_end: Option<i64>,
    pub items_step: Option<i64>,
    pub modes: Option<String>,
    pub runs: i64,
    pub poll_interval_ms: i64,
    pub timeout_ms: i64,
    pub sampler_interval_ms: i64,

    /// Overrides the profile's sampling default when set.
    pub sample_heap: Option<bool>,
}

impl Default for PlanInputs {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            items_list: None,
            items_start: None,
            items_end: None,
            items_step: None,
            modes: None,
            runs: DEFAULT_RUNS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            sampler_interval_ms: DEFAULT_SAMPLER_INTERVAL_MS,
            sample_heap: None,
        }
    }
}

/// Validated, immutable description of one benchmark invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub profile: Profile,
    pub base_url: String,
    pub items: Vec<u64>,
    pub modes: Vec<Mode>,
    pub runs: u32,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub sample_heap: bool,
    pub sampler_interval: Duration,
    /// Upper bound on waiting for the sampler to stop once signalled.
    pub join_grace: Duration,
    pub control_timeout: Duration,
    pub metric_timeout: Duration,
}

impl RunPlan {
    pub fn resolve(profile: Profile, inputs: &PlanInputs) -> Result<Self, ConfigError> {
        let base_url = inputs.base_url.trim().trim_end_matches('/').to_string();
        match url::Url::parse(&base_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::InvalidBaseUrl(inputs.base_url.clone())),
        }

        let items = match (inputs.items_start, inputs.items_end) {
            (Some(start), Some(end)) => {
                items_range(start, end, inputs.items_step.unwrap_or(DEFAULT_ITEMS_STEP))?
            }
            _ => parse_items_list(inputs.items_list.as_deref().unwrap_or(DEFAULT_ITEMS_LIST))?,
        };

        let modes = match inputs.modes.as_deref() {
            Some(raw) => parse_modes(raw)?,
            None => profile.default_modes().to_vec(),
        };
        if let Some(mode) = modes.iter().copied().find(|m| !profile.allows(*m)) {
            return Err(ConfigError::ModeNotAllowed { mode, profile });
        }

        let runs = u32::try_from(inputs.runs)
            .ok()
            .filter(|r| *r > 0)
            .ok_or(ConfigError::InvalidRuns)?;

        Ok(Self {
            profile,
            base_url,
            items,
            modes,
            runs,
            poll_interval: positive_millis("POLL_INTERVAL_MS", inputs.poll_interval_ms)?,
            timeout: positive_millis("TIMEOUT_MS", inputs.timeout_ms)?,
            sample_heap: inputs.sample_heap.unwrap_or(profile.samples_heap()),
            sampler_interval: positive_millis("MEMORY_POLL_MS", inputs.sampler_interval_ms)?,
            join_grace: DEFAULT_JOIN_GRACE,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            metric_timeout: DEFAULT_METRIC_TIMEOUT,
        })
    }

    /// Every (items, mode, repetition) tuple in execution order. Repetitions are 1-based.
    pub fn iterations(&self) -> impl Iterator<Item = (u64, Mode, u32)> + '_ {
        self.items.iter().flat_map(move |&items| {
            self.modes
                .iter()
                .flat_map(move |&mode| (1..=self.runs).map(move |run| (items, mode, run)))
        })
    }

    #[must_use]
    pub fn total_iterations(&self) -> usize {
        self.items.len() * self.modes.len() * self.runs as usize
    }
}

pub fn parse_items_list(raw: &str) -> Result<Vec<u64>, ConfigError> {
    let mut items = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let value: i64 = part
            .parse()
            .map_err(|_| ConfigError::InvalidItem(part.to_string()))?;
        items.push(positive_items(value)?);
    }
    if items.is_empty() {
        return Err(ConfigError::EmptyItems);
    }
    Ok(items)
}

/// Inclusive range `start..=end` stepping by `step`.
pub fn items_range(start: i64, end: i64, step: i64) -> Result<Vec<u64>, ConfigError> {
    if step <= 0 {
        return Err(ConfigError::InvalidStep);
    }
    if end < start {
        return Err(ConfigError::InvalidRange);
    }
    let step = step.unsigned_abs() as usize;
    (start..=end).step_by(step).map(positive_items).collect()
}

pub fn parse_modes(raw: &str) -> Result<Vec<Mode>, ConfigError> {
    let modes = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<Mode>()
                .map_err(|_| ConfigError::UnknownMode(part.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if modes.is_empty() {
        return Err(ConfigError::EmptyModes);
    }
    Ok(modes)
}

fn positive_items(value: i64) -> Result<u64, ConfigError> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or(ConfigError::NonPositiveItems(value))
}

fn positive_millis(name: &'static str, ms: i64) -> Result<Duration, ConfigError> {
    u64::try_from(ms)
        .ok()
        .filter(|v| *v > 0)
        .map(Duration::from_millis)
        .ok_or(ConfigError::NonPositiveInterval(name))
}
