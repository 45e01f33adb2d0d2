use std::{fmt, str::FromStr, time::Duration};

use crate::errors::ConfigError;

/// Hedge delay used by the aggregation endpoint when none is configured.
pub const DEFAULT_HEDGE_DELAY: Duration = Duration::from_millis(94);

/// Address of one interchangeable backend, e.g. `http://localhost:8081`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(pub String);

impl Endpoint {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(addr: &str) -> Self {
        Self(addr.to_string())
    }
}

impl From<String> for Endpoint {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

/// Race policy applied to one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RaceMode {
    /// One attempt against the primary, nothing else.
    #[default]
    Standard,
    /// Primary and secondary issued together, sharing one cancellation handle.
    Tied,
    /// Primary first; secondary only once the hedge delay elapses without a success.
    Hedged,
}

impl RaceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaceMode::Standard => "standard",
            RaceMode::Tied => "tied",
            RaceMode::Hedged => "hedged",
        }
    }

    /// Whether this mode needs a secondary endpoint.
    pub fn needs_secondary(&self) -> bool {
        !matches!(self, RaceMode::Standard)
    }
}

impl fmt::Display for RaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RaceMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(RaceMode::Standard),
            "tied" => Ok(RaceMode::Tied),
            "hedged" => Ok(RaceMode::Hedged),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Configuration of a single race.
///
/// Built per dispatch and never mutated by the dispatcher. Use the
/// [`standard`](Self::standard), [`tied`](Self::tied) and
/// [`hedged`](Self::hedged) constructors for the common shapes; the optional
/// knobs default to the plain behaviour.
#[derive(Debug, Clone)]
pub struct RaceConfig {
    /// Race policy.
    pub mode: RaceMode,

    /// Endpoint that is always called first.
    pub primary: Endpoint,

    /// Second endpoint, required for [`RaceMode::Tied`] and [`RaceMode::Hedged`].
    ///
    /// Ignored by [`RaceMode::Standard`].
    pub secondary: Option<Endpoint>,

    /// Time after issuing the primary before the secondary is issued.
    ///
    /// Only read by [`RaceMode::Hedged`].
    pub hedge_after: Duration,

    /// End a hedged race with absence when the primary fails before the
    /// hedge delay elapses, instead of still issuing the secondary.
    pub abort_on_primary_failure: bool,

    /// Caller-supplied bound on the whole dispatch.
    ///
    /// When it elapses every pending attempt is cancelled and the dispatch
    /// resolves to absence. `None` means the race runs until an attempt
    /// succeeds or every attempt fails.
    pub deadline: Option<Duration>,
}

impl RaceConfig {
    pub fn standard(primary: impl Into<Endpoint>) -> Self {
        Self {
            mode: RaceMode::Standard,
            primary: primary.into(),
            secondary: None,
            hedge_after: Duration::ZERO,
            abort_on_primary_failure: false,
            deadline: None,
        }
    }

    pub fn tied(primary: impl Into<Endpoint>, secondary: impl Into<Endpoint>) -> Self {
        Self {
            mode: RaceMode::Tied,
            secondary: Some(secondary.into()),
            ..Self::standard(primary)
        }
    }

    pub fn hedged(
        primary: impl Into<Endpoint>,
        secondary: impl Into<Endpoint>,
        hedge_after: Duration,
    ) -> Self {
        Self {
            mode: RaceMode::Hedged,
            secondary: Some(secondary.into()),
            hedge_after,
            ..Self::standard(primary)
        }
    }

    /// Builds the configuration for `mode` from an endpoint pair.
    ///
    /// `Standard` keeps only the primary.
    pub fn for_mode(
        mode: RaceMode,
        primary: impl Into<Endpoint>,
        secondary: impl Into<Endpoint>,
        hedge_after: Duration,
    ) -> Self {
        match mode {
            RaceMode::Standard => Self::standard(primary),
            RaceMode::Tied => Self::tied(primary, secondary),
            RaceMode::Hedged => Self::hedged(primary, secondary, hedge_after),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn abort_on_primary_failure(mut self, abort: bool) -> Self {
        self.abort_on_primary_failure = abort;
        self
    }

    /// Rejects configurations no race can be run from.
    ///
    /// `Duration` cannot be negative, so the hedge delay is valid by
    /// construction; a zero delay issues the secondary on the first timer tick.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary.as_str().trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint("primary"));
        }

        if !self.mode.needs_secondary() {
            return Ok(());
        }

        match &self.secondary {
            None => Err(ConfigError::MissingSecondary(self.mode)),
            Some(s) if s.as_str().trim().is_empty() => Err(ConfigError::EmptyEndpoint("secondary")),
            Some(_) => Ok(()),
        }
    }
}
