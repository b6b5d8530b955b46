use anyhow::{bail, Result};
use std::collections::BTreeMap;
use tracing::warn;
use warden_core::AccountId;

/// Responsiveness of the moving average (`WEIGHT_ALPHA`).
pub const DEFAULT_WEIGHT_ALPHA: f64 = 0.7;
/// Floor of every account weight (`WEIGHT_MIN`).
pub const DEFAULT_WEIGHT_MIN: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightParams {
    alpha: f64,
    min: f64,
}

impl WeightParams {
    pub fn new(alpha: f64, min: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            bail!("weight alpha must be in (0, 1], got {}", alpha);
        }
        if !(min.is_finite() && min > 0.0) {
            bail!("weight floor must be a positive number, got {}", min);
        }
        Ok(WeightParams { alpha, min })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn min(&self) -> f64 {
        self.min
    }
}

impl Default for WeightParams {
    fn default() -> Self {
        WeightParams {
            alpha: DEFAULT_WEIGHT_ALPHA,
            min: DEFAULT_WEIGHT_MIN,
        }
    }
}

/// Smoothed load of one account. The value never drops below the floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedWeight {
    value: f64,
    samples: u64,
}

impl SmoothedWeight {
    pub fn new(params: &WeightParams) -> Self {
        SmoothedWeight {
            value: params.min,
            samples: 0,
        }
    }

    /// `new = alpha * sample + (1 - alpha) * previous`, floored at `min`.
    pub fn update(&mut self, sample: f64, params: &WeightParams) -> f64 {
        let next = params.alpha * sample + (1.0 - params.alpha) * self.value;
        self.value = next.max(params.min);
        self.samples += 1;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// Per-account smoothed load, the seed of the balancer's running load.
#[derive(Debug, Clone, Default)]
pub struct WeightTracker {
    params: WeightParams,
    weights: BTreeMap<AccountId, SmoothedWeight>,
}

impl WeightTracker {
    pub fn new(params: WeightParams) -> Self {
        WeightTracker {
            params,
            weights: BTreeMap::new(),
        }
    }

    /// Folds one throughput sample into the account's weight and returns the new weight.
    ///
    /// Negative or non-finite samples are discarded.
    pub fn observe(&mut self, account_id: &AccountId, sample: f64) -> f64 {
        if !sample.is_finite() || sample < 0.0 {
            warn!(account_id = %account_id, sample, "discarding invalid load sample");
            return self.current_weight(account_id);
        }
        let params = self.params;
        self.weights
            .entry(account_id.clone())
            .or_insert_with(|| SmoothedWeight::new(&params))
            .update(sample, &params)
    }

    /// Weight of an account, `min` for accounts never observed.
    pub fn current_weight(&self, account_id: &AccountId) -> f64 {
        self.weights
            .get(account_id)
            .map(SmoothedWeight::value)
            .unwrap_or(self.params.min)
    }

    pub fn forget(&mut self, account_id: &AccountId) {
        self.weights.remove(account_id);
    }

    pub fn params(&self) -> WeightParams {
        self.params
    }

    pub fn snapshot(&self) -> WeightSnapshot {
        WeightSnapshot {
            weights: self
                .weights
                .iter()
                .map(|(account, weight)| (account.clone(), weight.value()))
                .collect(),
            floor: self.params.min,
        }
    }
}

/// Frozen copy of the weights used by one balancer run.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSnapshot {
    weights: BTreeMap<AccountId, f64>,
    floor: f64,
}

impl WeightSnapshot {
    /// Every account at `floor`.
    pub fn uniform(floor: f64) -> Self {
        WeightSnapshot {
            weights: BTreeMap::new(),
            floor,
        }
    }

    pub fn with(mut self, account_id: AccountId, weight: f64) -> Self {
        self.weights.insert(account_id, weight.max(self.floor));
        self
    }

    pub fn get(&self, account_id: &AccountId) -> f64 {
        self.weights.get(account_id).copied().unwrap_or(self.floor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, f64)> {
        self.weights.iter().map(|(account, weight)| (account, *weight))
    }
}

impl Default for WeightSnapshot {
    fn default() -> Self {
        WeightSnapshot::uniform(DEFAULT_WEIGHT_MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(id: &str) -> AccountId {
        AccountId::new(id).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_params_validation() {
        assert!(WeightParams::new(0.0, 0.05).is_err());
        assert!(WeightParams::new(1.1, 0.05).is_err());
        assert!(WeightParams::new(f64::NAN, 0.05).is_err());
        assert!(WeightParams::new(0.5, 0.0).is_err());
        assert!(WeightParams::new(1.0, 0.01).is_ok());
    }

    #[test]
    fn test_ema_update() {
        let mut tracker = WeightTracker::new(WeightParams::default());
        let a = acc("acc1");

        // first sample blends with the floor
        let w1 = tracker.observe(&a, 10.0);
        assert!(close(w1, 0.7 * 10.0 + 0.3 * 0.05));

        let w2 = tracker.observe(&a, 0.0);
        assert!(close(w2, 0.3 * w1));
        assert!(close(tracker.current_weight(&a), w2));
    }

    #[test]
    fn test_weight_never_below_floor() {
        let params = WeightParams::new(0.9, 0.05).unwrap();
        let mut tracker = WeightTracker::new(params);
        let a = acc("acc1");

        tracker.observe(&a, 100.0);
        for _ in 0..50 {
            let w = tracker.observe(&a, 0.0);
            assert!(w >= 0.05);
        }
        assert!(close(tracker.current_weight(&a), 0.05));
    }

    #[test]
    fn test_unknown_and_invalid_samples() {
        let mut tracker = WeightTracker::new(WeightParams::default());
        let a = acc("acc1");
        assert_eq!(tracker.current_weight(&a), DEFAULT_WEIGHT_MIN);

        tracker.observe(&a, 4.0);
        let before = tracker.current_weight(&a);
        assert_eq!(tracker.observe(&a, f64::NAN), before);
        assert_eq!(tracker.observe(&a, -3.0), before);

        tracker.forget(&a);
        assert_eq!(tracker.current_weight(&a), DEFAULT_WEIGHT_MIN);
    }

    #[test]
    fn test_alpha_one_tracks_latest_sample() {
        let mut tracker = WeightTracker::new(WeightParams::new(1.0, 0.05).unwrap());
        let a = acc("acc1");
        tracker.observe(&a, 3.0);
        assert_eq!(tracker.observe(&a, 8.0), 8.0);
        assert_eq!(tracker.snapshot().get(&a), 8.0);
        assert_eq!(tracker.snapshot().get(&acc("other")), 0.05);
    }
}
