//! Generation of the metric [`Sample`]s sent to the ingestion endpoint.
//!
//! A [`SampleGenerator`] draws values uniformly from a *normal* range and, for anomalies, from an
//! elevated *anomaly* range. Whether a sample is anomalous is decided by an [`AnomalyRule`]: either
//! randomly with a fixed probability, or deterministically for every n-th sample.

use std::num::NonZeroU64;

use anyhow::{Context, Result};
use rand::distr::{Bernoulli, Distribution, Uniform};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// A closed interval `[min, max]` that sample values are drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct ValueRange {
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
}

impl ValueRange {
    /// Creates a new range from its bounds.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Returns `true` if the value lies within this range.
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    fn uniform(&self) -> Result<Uniform<f64>> {
        anyhow::ensure!(
            self.min.is_finite() && self.max.is_finite() && self.min < self.max,
            "invalid value range [{}, {}]",
            self.min,
            self.max
        );
        Uniform::new_inclusive(self.min, self.max)
            .with_context(|| format!("invalid value range [{}, {}]", self.min, self.max))
    }
}

/// The value ranges for normal and anomalous samples.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct ValueRanges {
    /// Range for regular samples.
    pub normal: ValueRange,
    /// Elevated range for anomalous samples.
    pub anomaly: ValueRange,
}

impl Default for ValueRanges {
    fn default() -> Self {
        Self {
            normal: ValueRange::new(20.0, 30.0),
            anomaly: ValueRange::new(100.0, 150.0),
        }
    }
}

/// Decides which samples carry an anomalous value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnomalyRule {
    /// Every sample is an anomaly with the given probability in `[0, 1]`.
    Probability(f64),
    /// The sample with identifier `id` is an anomaly iff `id % n == 0`.
    EveryNth(NonZeroU64),
}

/// A single metric sample, created, sent and discarded within one request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    /// Sequential identifier of the sample, starting at `1`.
    #[serde(skip)]
    pub id: u64,
    /// The device this sample is reported for.
    pub device_id: String,
    /// The measured value.
    pub value: f64,
    /// Whether the value was drawn from the anomaly range.
    #[serde(skip)]
    pub anomaly: bool,
}

/// A builder for creating a [`SampleGenerator`].
#[derive(Debug)]
pub struct SampleGeneratorBuilder {
    device_prefix: String,
    seed: u64,
    ranges: ValueRanges,
    rule: AnomalyRule,
}

impl SampleGeneratorBuilder {
    /// Fixes the seed of the generator, making the produced values reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The normal and anomalous value ranges.
    pub fn ranges(mut self, ranges: ValueRanges) -> Self {
        self.ranges = ranges;
        self
    }

    /// The rule deciding which samples are anomalies.
    pub fn rule(mut self, rule: AnomalyRule) -> Self {
        self.rule = rule;
        self
    }

    /// Creates the generator, validating ranges and anomaly rule.
    pub fn build(self) -> Result<SampleGenerator> {
        let rule = match self.rule {
            AnomalyRule::Probability(p) => Rule::Random(
                Bernoulli::new(p).with_context(|| format!("invalid anomaly probability {p}"))?,
            ),
            AnomalyRule::EveryNth(n) => Rule::Modulo(n),
        };

        Ok(SampleGenerator {
            device_prefix: self.device_prefix,
            rng: SmallRng::seed_from_u64(self.seed),
            normal: self.ranges.normal.uniform()?,
            anomaly: self.ranges.anomaly.uniform()?,
            rule,
        })
    }
}

#[derive(Debug)]
enum Rule {
    Random(Bernoulli),
    Modulo(NonZeroU64),
}

/// Produces [`Sample`]s with a controlled share of anomalies.
#[derive(Debug)]
pub struct SampleGenerator {
    device_prefix: String,
    /// The RNG driving all our distributions.
    rng: SmallRng,
    normal: Uniform<f64>,
    anomaly: Uniform<f64>,
    rule: Rule,
}

impl SampleGenerator {
    /// Constructs a new builder for samples whose device IDs start with `device_prefix`.
    ///
    /// Defaults to the standard value ranges, a random seed, and a 10% anomaly probability.
    pub fn builder(device_prefix: impl Into<String>) -> SampleGeneratorBuilder {
        SampleGeneratorBuilder {
            device_prefix: device_prefix.into(),
            seed: rand::random(),
            ranges: ValueRanges::default(),
            rule: AnomalyRule::Probability(0.1),
        }
    }

    /// Creates the sample with the given identifier.
    pub fn sample(&mut self, id: u64) -> Sample {
        let anomaly = match &self.rule {
            Rule::Random(bernoulli) => bernoulli.sample(&mut self.rng),
            Rule::Modulo(n) => id % n.get() == 0,
        };
        let value = if anomaly {
            self.anomaly.sample(&mut self.rng)
        } else {
            self.normal.sample(&mut self.rng)
        };

        Sample {
            id,
            device_id: format!("{}{id}", self.device_prefix),
            value,
            anomaly,
        }
    }

    /// Returns an iterator over the samples with identifiers `1..=count`.
    pub fn samples(&mut self, count: u64) -> impl Iterator<Item = Sample> + '_ {
        (1..=count).map(move |id| self.sample(id))
    }
}
