use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Plan & Scenario
// ============================================================================

/// A resolved set of scenarios sharing one HTTP client configuration.
#[derive(Debug, Clone)]
pub struct Plan {
    pub name: String,
    pub parallel: bool,
    pub http_client: HttpClientConfig,
    pub scenarios: Vec<Scenario>,
}

/// A fully resolved scenario, ready to be executed by a `Runner`.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub load: Load,
    pub request: HttpRequest,
    pub checks: Vec<Check>,
    pub thresholds: Vec<Threshold>,
}

#[derive(Debug, Clone)]
pub enum Load {
    /// Flat rate for the whole duration.
    Constant {
        rps: u32,
        duration: Duration,
        threads: u32,
    },
    /// Ordered ramp segments.
    Staged(Vec<Stage>),
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub rps: u32,
    pub threads: u32,
    pub duration: Duration,
}

/// One generator/worker-pool pass. Flat scenarios run as a single segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub start_rps: u32,
    pub target_rps: u32,
    pub threads: u32,
    pub duration: Duration,
}

pub(crate) const MIN_DURATION: Duration = Duration::from_secs(1);

impl Scenario {
    /// Rate, thread count and duration are floored at 1 (1s for duration);
    /// each stage starts at the previous stage's target, the first at 0.
    pub fn segments(&self) -> Vec<Segment> {
        match &self.load {
            Load::Constant {
                rps,
                duration,
                threads,
            } => vec![Segment {
                name: self.name.clone(),
                start_rps: (*rps).max(1),
                target_rps: (*rps).max(1),
                threads: (*threads).max(1),
                duration: (*duration).max(MIN_DURATION),
            }],
            Load::Staged(stages) => {
                let mut previous = 0;
                stages
                    .iter()
                    .map(|stage| {
                        let target = stage.rps.max(1);
                        let segment = Segment {
                            name: stage.name.clone(),
                            start_rps: previous,
                            target_rps: target,
                            threads: stage.threads.max(1),
                            duration: stage.duration.max(MIN_DURATION),
                        };
                        previous = target;
                        segment
                    })
                    .collect()
            }
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.segments().iter().map(|s| s.duration).sum()
    }

    pub fn max_threads(&self) -> u32 {
        self.segments()
            .iter()
            .map(|s| s.threads)
            .max()
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: reqwest::Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub max_idle_conns_per_host: usize,
    pub disable_keep_alive: bool,
    pub timeout: Duration,
    pub disable_follow_redirects: bool,
}

pub const DEFAULT_MAX_IDLE_CONNS_PER_HOST: usize = 100;

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            max_idle_conns_per_host: DEFAULT_MAX_IDLE_CONNS_PER_HOST,
            disable_keep_alive: false,
            timeout: Duration::from_secs(5),
            disable_follow_redirects: false,
        }
    }
}

// ============================================================================
// Checks & Thresholds
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectation {
    pub equals: Option<String>,
    pub contains: Option<String>,
}

impl Expectation {
    /// No criterion configured means the check only records the value.
    pub fn matches(&self, actual: &str) -> bool {
        if let Some(expected) = &self.equals {
            return actual == expected;
        }
        if let Some(needle) = &self.contains {
            return actual.contains(needle.as_str());
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Code { expect: Expectation },
    Header { name: String, expect: Expectation },
    Body { expect: Expectation },
}

impl Check {
    pub fn kind(&self) -> CheckKind {
        match self {
            Check::Code { .. } => CheckKind::Code,
            Check::Header { .. } => CheckKind::Header,
            Check::Body { .. } => CheckKind::Body,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Check::Header { name, .. } => Some(name),
            Check::Code { .. } | Check::Body { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Code,
    Header,
    Body,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Code => "code",
            CheckKind::Header => "header",
            CheckKind::Body => "body",
        }
    }
}

impl FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(CheckKind::Code),
            "header" => Ok(CheckKind::Header),
            "body" => Ok(CheckKind::Body),
            other => Err(format!(
                "unknown check type '{}'. Expected code, header or body",
                other
            )),
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    /// Pass rate and pass count of one check type.
    Checks {
        kind: CheckKind,
        min_rate: Option<f64>,
        max_rate: Option<f64>,
        min_count: Option<u64>,
        max_count: Option<u64>,
    },
    /// Latency in milliseconds at a percentile.
    Latency {
        percentile: f64,
        min_value: Option<f64>,
        max_value: Option<f64>,
    },
}

impl Threshold {
    pub fn metric(&self) -> &'static str {
        match self {
            Threshold::Checks { .. } => "checks",
            Threshold::Latency { .. } => "latency",
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Dns,
    Connect,
    Tls,
    Refused,
    Reset,
    Request,
    Http,
    Body,
    Other,
}

impl ErrorKind {
    pub fn from_reqwest_error(err: &reqwest::Error) -> Self {
        let text = err.to_string().to_lowercase();
        if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_builder() {
            ErrorKind::Request
        } else if err.is_connect() {
            if text.contains("dns") || text.contains("resolve") {
                ErrorKind::Dns
            } else if text.contains("refused") {
                ErrorKind::Refused
            } else if text.contains("reset") {
                ErrorKind::Reset
            } else {
                ErrorKind::Connect
            }
        } else if err.is_request() {
            ErrorKind::Http
        } else if err.is_body() || err.is_decode() {
            ErrorKind::Body
        } else if text.contains("tls") || text.contains("certificate") {
            ErrorKind::Tls
        } else {
            ErrorKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Dns => "dns",
            ErrorKind::Connect => "connect",
            ErrorKind::Tls => "tls",
            ErrorKind::Refused => "refused",
            ErrorKind::Reset => "reset",
            ErrorKind::Request => "request",
            ErrorKind::Http => "http",
            ErrorKind::Body => "body",
            ErrorKind::Other => "other",
        }
    }
}

/// Why a single attempt produced no response.
#[derive(Debug, Clone)]
pub struct AttemptError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AttemptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        Self::new(ErrorKind::from_reqwest_error(err), err.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

// ============================================================================
// Per-attempt events
// ============================================================================

/// Labels describing one attempt. `code` is unset when no response arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub scenario: String,
    pub method: String,
    pub url: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterName {
    Total,
    Success,
    Failed,
    Timeout,
    Invalid,
}

impl CounterName {
    pub const ALL: [CounterName; 5] = [
        CounterName::Total,
        CounterName::Success,
        CounterName::Failed,
        CounterName::Timeout,
        CounterName::Invalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterName::Total => "total",
            CounterName::Success => "success",
            CounterName::Failed => "failed",
            CounterName::Timeout => "timeout",
            CounterName::Invalid => "invalid",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            CounterName::Total => 0,
            CounterName::Success => 1,
            CounterName::Failed => 2,
            CounterName::Timeout => 3,
            CounterName::Invalid => 4,
        }
    }
}

impl FromStr for CounterName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CounterName::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown counter '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(load: Load) -> Scenario {
        Scenario {
            name: "s".to_string(),
            load,
            request: HttpRequest {
                url: "http://localhost".to_string(),
                method: reqwest::Method::GET,
                headers: Vec::new(),
                body: None,
            },
            checks: Vec::new(),
            thresholds: Vec::new(),
        }
    }

    #[test]
    fn test_constant_load_is_floored() {
        let s = scenario(Load::Constant {
            rps: 0,
            duration: Duration::ZERO,
            threads: 0,
        });
        let segments = s.segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_rps, 1);
        assert_eq!(segments[0].target_rps, 1);
        assert_eq!(segments[0].threads, 1);
        assert_eq!(segments[0].duration, Duration::from_secs(1));
    }

    #[test]
    fn test_stages_chain_start_rates() {
        let s = scenario(Load::Staged(vec![
            Stage {
                name: "up".to_string(),
                rps: 10,
                threads: 2,
                duration: Duration::from_secs(5),
            },
            Stage {
                name: "hold".to_string(),
                rps: 20,
                threads: 4,
                duration: Duration::from_secs(10),
            },
        ]));
        let segments = s.segments();
        assert_eq!(segments[0].start_rps, 0);
        assert_eq!(segments[0].target_rps, 10);
        assert_eq!(segments[1].start_rps, 10);
        assert_eq!(segments[1].target_rps, 20);
        assert_eq!(s.total_duration(), Duration::from_secs(15));
        assert_eq!(s.max_threads(), 4);
    }

    #[test]
    fn test_expectation_without_criteria_passes() {
        assert!(Expectation::default().matches("anything"));
    }

    #[test]
    fn test_expectation_equals_wins_over_contains() {
        let e = Expectation {
            equals: Some("ok".to_string()),
            contains: Some("o".to_string()),
        };
        assert!(e.matches("ok"));
        assert!(!e.matches("oops"));
    }

    #[test]
    fn test_counter_name_round_trip() {
        for name in CounterName::ALL {
            assert_eq!(name.as_str().parse::<CounterName>(), Ok(name));
        }
        assert!("sent".parse::<CounterName>().is_err());
    }
}
