//! Row-height convergence.
//!
//! Rows with asynchronously laid out content are sampled on every tick until
//! their height stops changing, then the last sample is frozen. The state
//! transition lives in [`HeightTracker::apply`], a pure function of the
//! tracker and one round of samples; [`HeightConvergenceLoop`] adds the
//! sampler callbacks and the running flag, and leaves actual scheduling to
//! the caller.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use log::{debug, trace};

use crate::comment::CommentId;
use crate::config::ThreadConfig;

/// When a sample counts as a change, and how long to wait before giving up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightPolicy {
    /// Samples further apart than this count as a change.
    pub tolerance: f64,
    /// A row freezes once its stale count exceeds this.
    pub max_stale_ticks: u32,
}

impl Default for HeightPolicy {
    fn default() -> Self {
        Self {
            tolerance: 1.0,
            max_stale_ticks: 3,
        }
    }
}

impl From<&ThreadConfig> for HeightPolicy {
    fn from(config: &ThreadConfig) -> Self {
        Self {
            tolerance: config.height_tolerance,
            max_stale_ticks: config.max_stale_ticks,
        }
    }
}

/// Lifecycle of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowState {
    Unregistered,
    Converging {
        last_sample: Option<f64>,
        stale_count: u32,
    },
    Frozen(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ConvergingRow {
    last_sample: Option<f64>,
    stale_count: u32,
}

/// Result of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// Rows whose recorded height changed; they need a relayout.
    pub changed: BTreeSet<CommentId>,
    /// Rows that froze on this tick, with their final height.
    pub frozen: Vec<(CommentId, f64)>,
}

impl TickOutcome {
    #[must_use]
    pub fn needs_relayout(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Per-row convergence bookkeeping without callbacks or timers.
#[derive(Debug, Clone, Default)]
pub struct HeightTracker {
    policy: HeightPolicy,
    converging: BTreeMap<CommentId, ConvergingRow>,
    frozen: HashMap<CommentId, f64>,
}

impl HeightTracker {
    #[must_use]
    pub fn new(policy: HeightPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn state(&self, id: CommentId) -> RowState {
        if let Some(height) = self.frozen.get(&id) {
            return RowState::Frozen(*height);
        }
        self.converging
            .get(&id)
            .map_or(RowState::Unregistered, |row| RowState::Converging {
                last_sample: row.last_sample,
                stale_count: row.stale_count,
            })
    }

    /// Move an unregistered row into `converging`. Returns `false` if the row
    /// is already converging or frozen.
    pub fn begin(&mut self, id: CommentId) -> bool {
        if self.frozen.contains_key(&id) || self.converging.contains_key(&id) {
            return false;
        }
        self.converging.insert(id, ConvergingRow::default());
        true
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.converging.is_empty()
    }

    #[must_use]
    pub fn frozen_height(&self, id: CommentId) -> Option<f64> {
        self.frozen.get(&id).copied()
    }

    /// Best known height: frozen, else the latest sample.
    #[must_use]
    pub fn height(&self, id: CommentId) -> Option<f64> {
        self.frozen_height(id)
            .or_else(|| self.converging.get(&id).and_then(|row| row.last_sample))
    }

    /// Feed one round of samples. Samples for rows that are not converging
    /// are ignored.
    pub fn apply(&mut self, samples: &[(CommentId, f64)]) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        for &(id, sample) in samples {
            let Some(row) = self.converging.get_mut(&id) else {
                continue;
            };
            match row.last_sample {
                None => {
                    row.last_sample = Some(sample);
                    row.stale_count = 0;
                    outcome.changed.insert(id);
                }
                Some(last) if (sample - last).abs() > self.policy.tolerance && sample != 0.0 => {
                    trace!("row {id} height {last} -> {sample}");
                    row.last_sample = Some(sample);
                    row.stale_count = 0;
                    outcome.changed.insert(id);
                }
                Some(last) => {
                    row.stale_count += 1;
                    if row.stale_count > self.policy.max_stale_ticks {
                        outcome.frozen.push((id, last));
                    }
                }
            }
        }

        for &(id, height) in &outcome.frozen {
            self.converging.remove(&id);
            self.frozen.insert(id, height);
            debug!("row {id} frozen at {height}");
        }
        outcome
    }

    pub fn clear(&mut self) {
        self.converging.clear();
        self.frozen.clear();
    }
}

/// Callback returning a row's current natural content height.
pub struct HeightSampler(Box<dyn FnMut() -> f64 + Send>);

impl HeightSampler {
    pub fn new(f: impl FnMut() -> f64 + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn sample(&mut self) -> f64 {
        (self.0)()
    }
}

impl fmt::Debug for HeightSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HeightSampler")
    }
}

/// What [`HeightConvergenceLoop::register`] did with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The row was unregistered and now converges.
    Started,
    /// The row was already converging; its sampler was swapped.
    Replaced,
    /// The row is frozen; nothing to do.
    Ignored,
}

/// Result of a pass that actually ran.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    /// Whether another tick must be scheduled.
    pub rearm: bool,
    /// Generation the next tick must carry.
    pub generation: u64,
}

/// Sampler-owning driver around [`HeightTracker`].
///
/// Ticks are re-armed cooperatively: the caller schedules the next one only
/// after a report asks for it, so passes never overlap. A tick carrying an
/// old generation is ignored, which makes ticks scheduled before a
/// [`reset`](Self::reset) harmless.
#[derive(Debug, Default)]
pub struct HeightConvergenceLoop {
    tracker: HeightTracker,
    samplers: BTreeMap<CommentId, HeightSampler>,
    running: bool,
    generation: u64,
}

impl HeightConvergenceLoop {
    #[must_use]
    pub fn new(policy: HeightPolicy) -> Self {
        Self {
            tracker: HeightTracker::new(policy),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn tracker(&self) -> &HeightTracker {
        &self.tracker
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn height(&self, id: CommentId) -> Option<f64> {
        self.tracker.height(id)
    }

    pub fn register(&mut self, id: CommentId, sampler: HeightSampler) -> Registration {
        if self.tracker.frozen_height(id).is_some() {
            return Registration::Ignored;
        }
        let registration = if self.tracker.begin(id) {
            Registration::Started
        } else {
            Registration::Replaced
        };
        self.samplers.insert(id, sampler);
        registration
    }

    /// Run the first pass if the loop is idle. A no-op while running.
    pub fn start(&mut self) -> Option<TickReport> {
        if self.running || self.tracker.is_idle() {
            return None;
        }
        self.running = true;
        Some(self.pass())
    }

    /// Run a scheduled pass. Ticks from another generation, or arriving while
    /// the loop is stopped, do nothing.
    pub fn tick(&mut self, generation: u64) -> Option<TickReport> {
        if !self.running || generation != self.generation {
            debug!("ignoring stale height tick (generation {generation})");
            return None;
        }
        Some(self.pass())
    }

    fn pass(&mut self) -> TickReport {
        let samples: Vec<(CommentId, f64)> = self
            .samplers
            .iter_mut()
            .map(|(id, sampler)| (*id, sampler.sample()))
            .collect();
        let outcome = self.tracker.apply(&samples);
        for (id, _) in &outcome.frozen {
            self.samplers.remove(id);
        }

        let rearm = !self.tracker.is_idle();
        if !rearm {
            self.running = false;
        }
        trace!(
            "height pass: {} changed, {} frozen, {} left",
            outcome.changed.len(),
            outcome.frozen.len(),
            self.samplers.len()
        );
        TickReport {
            outcome,
            rearm,
            generation: self.generation,
        }
    }

    /// Drop every row and invalidate any scheduled tick.
    pub fn reset(&mut self) {
        self.tracker.clear();
        self.samplers.clear();
        self.running = false;
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    fn run(tracker: &mut HeightTracker, id: CommentId, samples: &[f64]) -> Vec<TickOutcome> {
        samples.iter().map(|s| tracker.apply(&[(id, *s)])).collect()
    }

    fn scripted(samples: &[f64]) -> HeightSampler {
        let mut queue: VecDeque<f64> = samples.iter().copied().collect();
        let last = samples.last().copied().unwrap_or(0.0);
        HeightSampler::new(move || queue.pop_front().unwrap_or(last))
    }

    #[test]
    fn constant_height_freezes_after_stale_rounds() {
        let mut tracker = HeightTracker::new(HeightPolicy::default());
        tracker.begin(1);

        let outcomes = run(&mut tracker, 1, &[100.0; 5]);

        assert_eq!(outcomes[0].changed, BTreeSet::from([1]));
        for outcome in &outcomes[1..4] {
            assert!(outcome.changed.is_empty());
            assert!(outcome.frozen.is_empty());
        }
        assert_eq!(outcomes[4].frozen, vec![(1, 100.0)]);
        assert_eq!(tracker.state(1), RowState::Frozen(100.0));
        assert!(tracker.is_idle());
    }

    #[test]
    fn late_nonzero_growth_resets_stale_count() {
        let mut tracker = HeightTracker::new(HeightPolicy::default());
        tracker.begin(7);

        let outcomes = run(&mut tracker, 7, &[0.0, 0.0, 150.0, 150.0, 150.0, 150.0]);

        assert!(outcomes[0].needs_relayout());
        assert!(!outcomes[1].needs_relayout());
        assert_eq!(outcomes[2].changed, BTreeSet::from([7]));
        assert_eq!(
            tracker.state(7),
            RowState::Converging {
                last_sample: Some(150.0),
                stale_count: 3
            }
        );

        let last = tracker.apply(&[(7, 150.0)]);
        assert_eq!(last.frozen, vec![(7, 150.0)]);
        assert_eq!(tracker.frozen_height(7), Some(150.0));
    }

    #[test]
    fn drop_to_zero_and_small_jitter_count_as_stale() {
        let mut tracker = HeightTracker::new(HeightPolicy::default());
        tracker.begin(3);

        let outcomes = run(&mut tracker, 3, &[80.0, 0.0, 80.5, 81.0]);

        assert!(outcomes[1..].iter().all(|o| !o.needs_relayout()));
        assert_eq!(tracker.height(3), Some(80.0));
    }

    #[test]
    fn samples_for_unknown_rows_are_ignored() {
        let mut tracker = HeightTracker::new(HeightPolicy::default());
        let outcome = tracker.apply(&[(9, 40.0)]);
        assert_eq!(outcome, TickOutcome::default());
        assert_eq!(tracker.state(9), RowState::Unregistered);
    }

    #[test]
    fn one_batched_change_set_per_tick() {
        let mut tracker = HeightTracker::new(HeightPolicy::default());
        tracker.begin(1);
        tracker.begin(2);
        let outcome = tracker.apply(&[(1, 10.0), (2, 20.0)]);
        assert_eq!(outcome.changed, BTreeSet::from([1, 2]));
    }

    #[test]
    fn start_is_a_noop_while_running() {
        let mut heights = HeightConvergenceLoop::new(HeightPolicy::default());
        assert_eq!(heights.register(1, scripted(&[50.0])), Registration::Started);

        let report = heights.start().unwrap();
        assert!(report.rearm);
        assert!(heights.is_running());
        assert!(heights.start().is_none());
    }

    #[test]
    fn loop_stops_once_every_row_froze() {
        let mut heights = HeightConvergenceLoop::new(HeightPolicy::default());
        heights.register(1, scripted(&[60.0]));

        let mut report = heights.start().unwrap();
        let mut ticks = 1;
        while report.rearm {
            report = heights.tick(report.generation).unwrap();
            ticks += 1;
        }

        assert_eq!(ticks, 5);
        assert!(!heights.is_running());
        assert_eq!(heights.height(1), Some(60.0));
        assert_eq!(heights.register(1, scripted(&[90.0])), Registration::Ignored);
        assert!(heights.start().is_none());
    }

    #[test]
    fn reregistering_swaps_sampler_but_keeps_progress() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut heights = HeightConvergenceLoop::new(HeightPolicy::default());
        heights.register(1, scripted(&[40.0]));
        let report = heights.start().unwrap();

        let seen = Arc::clone(&calls);
        let replacement = HeightSampler::new(move || {
            seen.lock().unwrap().push(());
            40.0
        });
        assert_eq!(heights.register(1, replacement), Registration::Replaced);
        heights.tick(report.generation).unwrap();

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(
            heights.tracker().state(1),
            RowState::Converging {
                last_sample: Some(40.0),
                stale_count: 1
            }
        );
    }

    #[test]
    fn reset_invalidates_scheduled_ticks() {
        let mut heights = HeightConvergenceLoop::new(HeightPolicy::default());
        heights.register(1, scripted(&[10.0, 20.0]));
        let report = heights.start().unwrap();

        heights.reset();

        assert!(heights.tick(report.generation).is_none());
        assert_eq!(heights.tracker().state(1), RowState::Unregistered);
        assert!(!heights.is_running());
    }
}
