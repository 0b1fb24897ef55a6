//! Concurrency ramp made of stages

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageParseError {
    #[error("Invalid duration `{0}` (expected e.g. 500ms, 30s, 2m or 1h)")]
    Duration(String),

    #[error("Invalid stage `{0}` (expected <duration>:<target>)")]
    Stage(String),

    #[error("No stages given")]
    Empty,
}

/// Ramp linearly to `target` VUs over `duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Ordered stages starting from `start` VUs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ramp {
    pub start: u64,
    pub stages: Vec<Stage>,
}

impl Ramp {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { start: 0, stages }
    }

    pub fn starting_at(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest target the ramp ever asks for
    pub fn peak(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start, u64::max)
    }

    /// Target concurrency `elapsed` into the run
    ///
    /// Interpolates linearly inside the enclosing stage and rounds to the
    /// nearest VU. A stage boundary yields exactly that stage's target;
    /// zero-length stages jump. Past the end the final target holds.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let mut stage_start = Duration::ZERO;
        let mut from = self.start as f64;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let value = from + (stage.target as f64 - from) * progress;
                return value.round() as u64;
            }
            stage_start = stage_end;
            from = stage.target as f64;
        }

        from as u64
    }
}

/// Parse `500ms`, `30s`, `2m`, `1h` or a compound like `1m30s`
pub fn parse_duration(s: &str) -> Result<Duration, StageParseError> {
    let err = || StageParseError::Duration(s.to_string());
    let s = s.trim();
    if s.is_empty() {
        return Err(err());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(err)?;
        if digits == 0 {
            return Err(err());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| err())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            _ => return Err(err()),
        };
        total += part;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

/// Parse `2m:100,30s:600` into a ramp starting from zero
pub fn parse_stages(s: &str) -> Result<Ramp, StageParseError> {
    let stages = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (duration, target) = part
                .split_once(':')
                .ok_or_else(|| StageParseError::Stage(part.to_string()))?;
            let target = target
                .trim()
                .parse()
                .map_err(|_| StageParseError::Stage(part.to_string()))?;
            Ok(Stage::new(parse_duration(duration)?, target))
        })
        .collect::<Result<Vec<_>, StageParseError>>()?;

    if stages.is_empty() {
        return Err(StageParseError::Empty);
    }
    Ok(Ramp::new(stages))
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
