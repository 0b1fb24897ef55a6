//! Typed threshold expressions
//!
//! Thresholds are written as `<metric>:<aggregation><operator><bound>`, e.g.
//! `errors:rate<0.05` or `http_req_duration:p(95)<500`. Trend bounds are in
//! milliseconds and may carry an `ms` or `s` suffix (`p(95) < 500ms`,
//! `max<1.5s`). They are parsed once
//! when the profile is loaded and evaluated in typed form afterwards.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdParseError {
    #[error("Threshold `{0}` has no metric name (expected <metric>:<expression>)")]
    MissingMetric(String),

    #[error("Threshold `{0}` has no comparison operator")]
    MissingOperator(String),

    #[error("Unknown aggregation `{0}` (expected rate, count, avg, min, max, med or p(N))")]
    UnknownAggregation(String),

    #[error("Percentile must be in (0, 100], got `{0}`")]
    InvalidPercentile(String),

    #[error("Invalid bound `{0}`")]
    InvalidBound(String),
}

/// Value of a metric a threshold compares
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Fraction of true samples of a rate
    Rate,
    /// Total of a counter
    Count,
    /// Percentile of a trend, in milliseconds
    Percentile(f64),
    Avg,
    Min,
    Max,
    Median,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Count => write!(f, "count"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Median => write!(f, "med"),
        }
    }
}

impl Aggregation {
    /// Whether this aggregation reads a latency trend (bounds in milliseconds)
    pub fn is_trend(&self) -> bool {
        !matches!(self, Aggregation::Rate | Aggregation::Count)
    }
}

impl FromStr for Aggregation {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "rate" => return Ok(Aggregation::Rate),
            "count" => return Ok(Aggregation::Count),
            "avg" => return Ok(Aggregation::Avg),
            "min" => return Ok(Aggregation::Min),
            "max" => return Ok(Aggregation::Max),
            "med" => return Ok(Aggregation::Median),
            _ => {}
        }

        let inner = s
            .strip_prefix("p(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| ThresholdParseError::UnknownAggregation(s.to_string()))?;
        let p: f64 = inner
            .trim()
            .parse()
            .map_err(|_| ThresholdParseError::InvalidPercentile(inner.to_string()))?;
        if !(p > 0.0 && p <= 100.0) {
            return Err(ThresholdParseError::InvalidPercentile(inner.to_string()));
        }
        Ok(Aggregation::Percentile(p))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
}

impl Operator {
    /// Longest tokens first so `<=` is not read as `<`
    const TOKENS: [(&'static str, Operator); 5] = [
        ("<=", Operator::Le),
        (">=", Operator::Ge),
        ("==", Operator::Eq),
        ("<", Operator::Lt),
        (">", Operator::Gt),
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "==",
        }
    }

    pub fn compare(&self, observed: f64, bound: f64) -> bool {
        match self {
            Operator::Lt => observed < bound,
            Operator::Le => observed <= bound,
            Operator::Gt => observed > bound,
            Operator::Ge => observed >= bound,
            Operator::Eq => observed == bound,
        }
    }
}

/// One pass/fail condition over a metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
    pub metric: String,
    pub aggregation: Aggregation,
    pub operator: Operator,
    pub bound: f64,
}

impl Threshold {
    pub fn new(
        metric: impl Into<String>,
        aggregation: Aggregation,
        operator: Operator,
        bound: f64,
    ) -> Self {
        Self {
            metric: metric.into(),
            aggregation,
            operator,
            bound,
        }
    }

    /// Parse an expression such as `p(95)<500` for `metric`
    pub fn parse(metric: &str, expr: &str) -> Result<Self, ThresholdParseError> {
        let metric = metric.trim();
        if metric.is_empty() {
            return Err(ThresholdParseError::MissingMetric(expr.to_string()));
        }

        let (at, len, operator) = Operator::TOKENS
            .iter()
            .filter_map(|(token, op)| expr.find(token).map(|at| (at, token.len(), *op)))
            .min_by_key(|(at, len, _)| (*at, usize::MAX - len))
            .ok_or_else(|| ThresholdParseError::MissingOperator(expr.to_string()))?;

        let aggregation: Aggregation = expr[..at].parse()?;
        let bound = parse_bound(expr[at + len..].trim(), aggregation)?;

        Ok(Self::new(metric, aggregation, operator, bound))
    }

    /// Expression part, e.g. `p(95)<500`
    pub fn expression(&self) -> String {
        format!("{}{}{}", self.aggregation, self.operator.symbol(), self.bound)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.expression())
    }
}

impl FromStr for Threshold {
    type Err = ThresholdParseError;

    /// `<metric>:<expression>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (metric, expr) = s
            .split_once(':')
            .ok_or_else(|| ThresholdParseError::MissingMetric(s.to_string()))?;
        Threshold::parse(metric, expr)
    }
}

/// Bound as a plain number; trend bounds also accept `ms` and `s` suffixes
/// and are normalized to milliseconds
fn parse_bound(s: &str, aggregation: Aggregation) -> Result<f64, ThresholdParseError> {
    let invalid = || ThresholdParseError::InvalidBound(s.to_string());

    let (number, scale) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1.0)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1000.0)
    } else {
        (s, 1.0)
    };
    if number.len() != s.len() && !aggregation.is_trend() {
        return Err(invalid());
    }

    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    let bound = value * scale;
    if !bound.is_finite() {
        return Err(invalid());
    }
    Ok(bound)
}

/// Parse a `;`-separated list of thresholds
pub fn parse_thresholds(s: &str) -> Result<Vec<Threshold>, ThresholdParseError> {
    s.split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_threshold() {
        let t: Threshold = "errors:rate<0.05".parse().unwrap();
        assert_eq!(t, Threshold::new("errors", Aggregation::Rate, Operator::Lt, 0.05));
        assert_eq!(t.to_string(), "errors: rate<0.05");
    }

    #[test]
    fn test_parse_percentile_threshold() {
        let t = Threshold::parse("http_req_duration", "p(95)<500").unwrap();
        assert_eq!(t.aggregation, Aggregation::Percentile(95.0));
        assert_eq!(t.operator, Operator::Lt);
        assert_eq!(t.bound, 500.0);
        assert_eq!(t.expression(), "p(95)<500");

        let t = Threshold::parse("http_req_duration", "p(99.9) <= 1500").unwrap();
        assert_eq!(t.aggregation, Aggregation::Percentile(99.9));
        assert_eq!(t.operator, Operator::Le);
    }

    #[test]
    fn test_parse_duration_bounds() {
        let t = Threshold::parse("http_req_duration", "p(95) < 500ms").unwrap();
        assert_eq!(t.aggregation, Aggregation::Percentile(95.0));
        assert_eq!(t.operator, Operator::Lt);
        assert_eq!(t.bound, 500.0);

        let t = Threshold::parse("http_req_duration", "max<1.5s").unwrap();
        assert_eq!(t.bound, 1500.0);

        assert!(matches!(
            Threshold::parse("errors", "rate<0.05s"),
            Err(ThresholdParseError::InvalidBound(_))
        ));
        assert!(matches!(
            Threshold::parse("http_req_duration", "p(95)<fastms"),
            Err(ThresholdParseError::InvalidBound(_))
        ));
    }

    #[test]
    fn test_parse_operators() {
        for (expr, op) in [
            ("count>10", Operator::Gt),
            ("count>=10", Operator::Ge),
            ("count<10", Operator::Lt),
            ("count<=10", Operator::Le),
            ("count==10", Operator::Eq),
        ] {
            assert_eq!(Threshold::parse("http_reqs", expr).unwrap().operator, op, "{expr}");
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "rate<0.05".parse::<Threshold>(),
            Err(ThresholdParseError::MissingMetric(_))
        ));
        assert!(matches!(
            Threshold::parse("errors", "rate"),
            Err(ThresholdParseError::MissingOperator(_))
        ));
        assert!(matches!(
            Threshold::parse("errors", "ratio<0.1"),
            Err(ThresholdParseError::UnknownAggregation(_))
        ));
        assert!(matches!(
            Threshold::parse("d", "p(0)<1"),
            Err(ThresholdParseError::InvalidPercentile(_))
        ));
        assert!(matches!(
            Threshold::parse("d", "p(101)<1"),
            Err(ThresholdParseError::InvalidPercentile(_))
        ));
        assert!(matches!(
            Threshold::parse("errors", "rate<lots"),
            Err(ThresholdParseError::InvalidBound(_))
        ));
    }

    #[test]
    fn test_parse_threshold_list() {
        let thresholds =
            parse_thresholds("errors:rate<0.05; http_req_duration:p(95)<500;").unwrap();
        assert_eq!(thresholds.len(), 2);
        assert_eq!(thresholds[1].metric, "http_req_duration");
        assert!(parse_thresholds("").unwrap().is_empty());
        assert!(parse_thresholds("errors:rate<0.05;bogus").is_err());
    }

    #[test]
    fn test_operator_strictness() {
        assert!(!Operator::Gt.compare(0.95, 0.95));
        assert!(Operator::Ge.compare(0.95, 0.95));
        assert!(!Operator::Lt.compare(500.0, 500.0));
        assert!(Operator::Le.compare(500.0, 500.0));
        assert!(Operator::Eq.compare(3.0, 3.0));
    }
}
