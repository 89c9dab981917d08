use std::fmt;

use super::error::{Error, Result};

/// Percentiles that are always reported, whatever was requested.
pub const BASELINE_PERCENTILES: [f64; 3] = [50.0, 95.0, 99.0];

/// Canonical report key for a percentile: `99` -> `p99`, `99.9` -> `p99_9`, `100` -> `p100`.
///
/// `f64`'s `Display` emits the shortest string that round-trips, without exponent and without
/// trailing zeros, so numerically distinct inputs always produce distinct keys.
pub fn percentile_key(p: f64) -> String {
    // Normalize -0.0 so it shares a key with 0.0.
    let p = if p == 0.0 { 0.0 } else { p };
    format!("p{p}").replace('.', "_")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentile {
    value: f64,
}

impl Percentile {
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(Error::InvalidPercentile(value.to_string()));
        }
        let value = if value == 0.0 { 0.0 } else { value };
        Ok(Self { value })
    }

    pub fn value(self) -> f64 {
        self.value
    }

    /// Fraction in `[0, 1]`.
    pub fn quantile(self) -> f64 {
        self.value / 100.0
    }

    pub fn key(self) -> String {
        percentile_key(self.value)
    }
}

impl fmt::Display for Percentile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Deduplicated, order-preserving set of requested percentiles.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileSet {
    requested: Vec<Percentile>,
}

impl Default for PercentileSet {
    fn default() -> Self {
        Self {
            requested: BASELINE_PERCENTILES
                .iter()
                .map(|&value| Percentile { value })
                .collect(),
        }
    }
}

impl PercentileSet {
    pub fn new<I>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut requested: Vec<Percentile> = Vec::new();
        for v in values {
            let p = Percentile::new(v)?;
            if !requested.iter().any(|seen| seen.value == p.value) {
                requested.push(p);
            }
        }
        if requested.is_empty() {
            return Err(Error::EmptyPercentiles);
        }
        Ok(Self { requested })
    }

    /// Parses a comma-separated list such as `50,95,99.9`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut values = Vec::new();
        for raw in input.split(',') {
            let item = raw.trim();
            let v: f64 = item
                .parse()
                .map_err(|_| Error::InvalidPercentile(item.to_string()))?;
            values.push(v);
        }
        Self::new(values)
    }

    /// The percentiles exactly as requested (after dedup).
    pub fn requested(&self) -> &[Percentile] {
        &self.requested
    }

    pub fn contains(&self, value: f64) -> bool {
        self.requested.iter().any(|p| p.value == value)
    }

    /// Baseline percentiles first, then any extra requested ones in request order.
    pub fn effective(&self) -> Vec<Percentile> {
        let mut out: Vec<Percentile> = BASELINE_PERCENTILES
            .iter()
            .map(|&value| Percentile { value })
            .collect();
        for p in &self.requested {
            if !out.iter().any(|seen| seen.value == p.value) {
                out.push(*p);
            }
        }
        out
    }

    pub fn values(&self) -> Vec<f64> {
        self.requested.iter().map(|p| p.value).collect()
    }
}
