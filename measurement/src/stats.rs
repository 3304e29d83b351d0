//! Statistics Aggregator: per-type reduction and cost ranking
//!
//! Event-stream samples are reduced with a two-level average: the mean over
//! a type's addresses within one iteration, then the mean of those
//! per-iteration means. The standard deviation is taken once over every
//! individual duration pooled across iterations (population form, N in the
//! denominator). Isolation runs reduce directly over the timed runs.

use std::time::Duration;

use serde::Serialize;

/// One observed duration for a resource address within an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub address: String,
    pub resource_type: String,
    pub iteration: usize,
    pub duration: Duration,
}

/// Reduced timing of one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStat {
    pub name: String,
    pub count: usize,
    pub mean: Duration,
    pub min: Duration,
    /// Address that produced `min`; empty for isolation measurements.
    pub min_address: String,
    pub max: Duration,
    pub max_address: String,
    pub std_dev: Duration,
}

impl ResourceStat {
    /// Contribution to total refresh time, `mean * count`, in nanoseconds.
    pub fn cost(&self) -> u128 {
        self.mean.as_nanos() * self.count as u128
    }

    /// `mean * count` as a duration (saturating).
    pub fn weighted_mean(&self) -> Duration {
        nanos_to_duration(self.cost())
    }
}

/// Sort by descending `mean * count`; equal costs keep their input order.
pub fn rank(stats: &mut [ResourceStat]) {
    stats.sort_by(|a, b| b.cost().cmp(&a.cost()));
}

/// Population standard deviation of `values`; zero for an empty slice.
pub fn population_std_dev(values: &[Duration]) -> Duration {
    if values.is_empty() {
        return Duration::ZERO;
    }
    let n = values.len() as f64;
    let nanos: Vec<f64> = values.iter().map(|d| d.as_nanos() as f64).collect();
    let mean = nanos.iter().sum::<f64>() / n;
    let variance = nanos.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Duration::from_nanos(variance.sqrt() as u64)
}

/// Arithmetic mean of `values`; zero for an empty slice.
pub fn mean(values: &[Duration]) -> Duration {
    if values.is_empty() {
        return Duration::ZERO;
    }
    let total: u128 = values.iter().map(Duration::as_nanos).sum();
    nanos_to_duration(total / values.len() as u128)
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Reduce the timed runs of one isolated resource type.
pub fn summarize_runs(name: &str, count: usize, runs: &[Duration]) -> ResourceStat {
    ResourceStat {
        name: name.to_string(),
        count,
        mean: mean(runs),
        min: runs.iter().min().copied().unwrap_or_default(),
        min_address: String::new(),
        max: runs.iter().max().copied().unwrap_or_default(),
        max_address: String::new(),
        std_dev: population_std_dev(runs),
    }
}

#[derive(Debug)]
struct TypeAccumulator {
    name: String,
    count: usize,
    mean_sum: u128,
    min: Option<(Duration, String)>,
    max: Option<(Duration, String)>,
    pooled: Vec<Duration>,
}

impl TypeAccumulator {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
            mean_sum: 0,
            min: None,
            max: None,
            pooled: Vec::new(),
        }
    }

    fn observe(&mut self, sample: &Sample) {
        self.pooled.push(sample.duration);
        if self.min.as_ref().map_or(true, |(d, _)| sample.duration < *d) {
            self.min = Some((sample.duration, sample.address.clone()));
        }
        if self.max.as_ref().map_or(true, |(d, _)| sample.duration > *d) {
            self.max = Some((sample.duration, sample.address.clone()));
        }
    }
}

/// Accumulates event-stream samples across iterations.
#[derive(Debug)]
pub struct EventStreamAggregator {
    iterations: u32,
    types: Vec<TypeAccumulator>,
}

impl EventStreamAggregator {
    /// `iterations` is the configured count; the final mean divides by it
    /// even for types that produced no samples in some iterations.
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
            types: Vec::new(),
        }
    }

    /// Fold in the samples of one iteration.
    pub fn record_iteration(&mut self, samples: &[Sample]) {
        let mut per_type: Vec<(&str, Vec<&Sample>)> = Vec::new();
        for sample in samples {
            match per_type
                .iter_mut()
                .find(|(name, _)| *name == sample.resource_type)
            {
                Some((_, group)) => group.push(sample),
                None => per_type.push((&sample.resource_type, vec![sample])),
            }
        }

        for (name, group) in per_type {
            let idx = match self.types.iter().position(|t| t.name == name) {
                Some(idx) => idx,
                None => {
                    self.types.push(TypeAccumulator::new(name));
                    self.types.len() - 1
                }
            };
            let acc = &mut self.types[idx];
            let total: u128 = group.iter().map(|s| s.duration.as_nanos()).sum();
            acc.mean_sum += total / group.len() as u128;
            acc.count = acc.count.max(group.len());
            for sample in group {
                acc.observe(sample);
            }
        }
    }

    /// Per-type statistics in first-appearance order (unranked).
    pub fn finish(self) -> Vec<ResourceStat> {
        let iterations = u128::from(self.iterations);
        self.types
            .into_iter()
            .map(|acc| {
                let (min, min_address) = acc.min.unwrap_or_default();
                let (max, max_address) = acc.max.unwrap_or_default();
                ResourceStat {
                    std_dev: population_std_dev(&acc.pooled),
                    name: acc.name,
                    count: acc.count,
                    mean: nanos_to_duration(acc.mean_sum / iterations),
                    min,
                    min_address,
                    max,
                    max_address,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(address: &str, iteration: usize, millis: u64) -> Sample {
        let resource_type = address.split('.').next().unwrap().to_string();
        Sample {
            address: address.to_string(),
            resource_type,
            iteration,
            duration: Duration::from_millis(millis),
        }
    }

    fn stat(name: &str, count: usize, mean_ms: u64) -> ResourceStat {
        ResourceStat {
            name: name.to_string(),
            count,
            mean: Duration::from_millis(mean_ms),
            min: Duration::ZERO,
            min_address: String::new(),
            max: Duration::ZERO,
            max_address: String::new(),
            std_dev: Duration::ZERO,
        }
    }

    #[test]
    fn test_two_level_mean_and_pooled_std_dev() {
        let mut agg = EventStreamAggregator::new(2);
        agg.record_iteration(&[
            sample("aws_vpc.a", 0, 1000),
            sample("aws_vpc.b", 0, 3000),
        ]);
        agg.record_iteration(&[sample("aws_vpc.a", 1, 4000)]);

        let stats = agg.finish();
        assert_eq!(stats.len(), 1);
        let vpc = &stats[0];
        // (mean(1s, 3s) + mean(4s)) / 2
        assert_eq!(vpc.mean, Duration::from_secs(3));
        assert_eq!(vpc.count, 2);

        // Population std dev of the three raw durations, sqrt(14/9) s,
        // not the 1s spread of the two iteration means.
        let expected = (14.0f64 / 9.0).sqrt();
        assert!((vpc.std_dev.as_secs_f64() - expected).abs() < 1e-6);
        assert_ne!(vpc.std_dev, Duration::from_secs(1));

        assert_eq!(vpc.min, Duration::from_secs(1));
        assert_eq!(vpc.min_address, "aws_vpc.a");
        assert_eq!(vpc.max, Duration::from_secs(4));
        assert_eq!(vpc.max_address, "aws_vpc.a");
    }

    #[test]
    fn test_mean_divides_by_configured_iterations() {
        let mut agg = EventStreamAggregator::new(3);
        agg.record_iteration(&[sample("random_id.x", 0, 300)]);
        agg.record_iteration(&[]);
        agg.record_iteration(&[]);
        let stats = agg.finish();
        assert_eq!(stats[0].mean, Duration::from_millis(100));
    }

    #[test]
    fn test_types_kept_apart_in_first_appearance_order() {
        let mut agg = EventStreamAggregator::new(1);
        agg.record_iteration(&[
            sample("random_id.a", 0, 10),
            sample("aws_vpc.main", 0, 500),
            sample("random_id.b", 0, 30),
        ]);
        let stats = agg.finish();
        let names: Vec<&str> = stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["random_id", "aws_vpc"]);
        assert_eq!(stats[0].mean, Duration::from_millis(20));
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[1].count, 1);
        assert_eq!(stats[1].std_dev, Duration::ZERO);
    }

    #[test]
    fn test_rank_by_cost_not_mean() {
        let mut stats = vec![
            stat("slow_single", 1, 900),
            stat("fast_many", 10, 100),
            stat("middle", 2, 300),
        ];
        rank(&mut stats);
        let names: Vec<&str> = stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["fast_many", "slow_single", "middle"]);
        assert!(stats.windows(2).all(|w| w[0].cost() >= w[1].cost()));
    }

    #[test]
    fn test_rank_is_stable_for_equal_cost() {
        let mut stats = vec![
            stat("first", 2, 100),
            stat("big", 1, 1000),
            stat("second", 1, 200),
            stat("third", 4, 50),
        ];
        rank(&mut stats);
        let names: Vec<&str> = stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["big", "first", "second", "third"]);
    }

    #[test]
    fn test_summarize_runs() {
        let runs = [
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(600),
        ];
        let stat = summarize_runs("aws_s3_bucket", 5, &runs);
        assert_eq!(stat.count, 5);
        assert_eq!(stat.mean, Duration::from_millis(400));
        assert_eq!(stat.min, Duration::from_millis(200));
        assert_eq!(stat.max, Duration::from_millis(600));
        assert!(stat.min_address.is_empty());
        assert_eq!(stat.weighted_mean(), Duration::from_secs(2));
    }

    #[test]
    fn test_population_std_dev() {
        assert_eq!(population_std_dev(&[]), Duration::ZERO);
        let values: Vec<Duration> = [2, 4, 4, 4, 5, 5, 7, 9]
            .into_iter()
            .map(Duration::from_secs)
            .collect();
        assert_eq!(population_std_dev(&values), Duration::from_secs(2));
    }
}
