//! Per-(antenna, tag) presence filtering
//!
//! Each scan cycle a tracked tag receives exactly one observation: heard
//! this cycle or not. The filter turns that noisy boolean into a presence
//! decision using the method active for the cycle:
//!
//! - `NoFiltering`: presence is the raw observation
//! - `WindowLpf`: majority vote over the last `window_size` observations
//! - `HmmViterbi`: two-state HMM (Present/Absent) decoded online, keeping
//!   only the current Viterbi probability vector
//!
//! The observation window is fed on every cycle regardless of method, so
//! switching to `WindowLpf` starts from real history. The Viterbi vector is
//! re-seeded from the last decision when `HmmViterbi` becomes active, which
//! avoids a spurious absence right after a switch.

use crate::domain::types::FilterMethod;
use crate::services::filter_registry::FilterTransition;

const PRESENT: usize = 0;
const ABSENT: usize = 1;

/// State transition matrix `A[from][to]`: 95% chance a tag keeps its state
pub const TRANSITION: [[f64; 2]; 2] = [
    [0.95, 0.05], // from Present
    [0.05, 0.95], // from Absent
];

/// Emission matrix `B[state][observation]`, observation 0 = missed, 1 = detected.
/// A present tag is read 90% of cycles; an absent tag is cross-read 20% of cycles.
pub const EMISSION: [[f64; 2]; 2] = [
    [0.1, 0.9], // Present
    [0.8, 0.2], // Absent
];

const PRIOR_UNIFORM: [f64; 2] = [0.5, 0.5];
const PRIOR_PRESENT: [f64; 2] = [0.95, 0.05];
const PRIOR_ABSENT: [f64; 2] = [0.05, 0.95];

/// Result of feeding one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub presence: bool,
    pub previous: bool,
}

impl PresenceUpdate {
    #[inline]
    pub fn flipped(&self) -> bool {
        self.presence != self.previous
    }
}

#[derive(Debug, Clone)]
pub struct TagFilter {
    /// Circular buffer of the last `window.len()` observations, zero-filled
    window: Vec<bool>,
    cursor: usize,
    /// Number of `true` entries in `window`
    hits: usize,
    /// Unnormalised forward probabilities `[present, absent]`
    viterbi: [f64; 2],
    presence: bool,
    previous: bool,
    updates: u64,
}

impl TagFilter {
    /// # Panics
    /// Never: a zero `window_size` is clamped to 1. Callers validate the
    /// configured size up front.
    pub fn new(window_size: usize) -> Self {
        Self {
            window: vec![false; window_size.max(1)],
            cursor: 0,
            hits: 0,
            viterbi: PRIOR_UNIFORM,
            presence: false,
            previous: false,
            updates: 0,
        }
    }

    /// Feed this cycle's observation under the cycle's method pair
    ///
    /// Total: always yields a decision, including on the first call.
    pub fn update(&mut self, detected: bool, transition: FilterTransition) -> PresenceUpdate {
        self.push_observation(detected);

        // A filter without history keeps the uniform prior
        if transition.entered(FilterMethod::HmmViterbi) && self.updates > 0 {
            self.reseed_viterbi();
        }

        let presence = match transition.current {
            FilterMethod::NoFiltering => detected,
            FilterMethod::WindowLpf => self.window_majority(),
            FilterMethod::HmmViterbi => self.viterbi_step(detected),
        };

        self.previous = self.presence;
        self.presence = presence;
        self.updates += 1;

        PresenceUpdate { presence, previous: self.previous }
    }

    #[inline]
    pub fn presence(&self) -> bool {
        self.presence
    }

    #[inline]
    pub fn previous(&self) -> bool {
        self.previous
    }

    pub fn viterbi(&self) -> [f64; 2] {
        self.viterbi
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    fn push_observation(&mut self, detected: bool) {
        let evicted = std::mem::replace(&mut self.window[self.cursor], detected);
        if evicted {
            self.hits -= 1;
        }
        if detected {
            self.hits += 1;
        }
        self.cursor = (self.cursor + 1) % self.window.len();
    }

    /// mean(window) > 0.5
    fn window_majority(&self) -> bool {
        self.hits * 2 > self.window.len()
    }

    /// Bias the vector toward the last decision
    fn reseed_viterbi(&mut self) {
        self.viterbi = if self.presence { PRIOR_PRESENT } else { PRIOR_ABSENT };
    }

    /// `V[j] = max_i(V[i] * A[i][j]) * B[j][obs]`, renormalised to avoid underflow
    fn viterbi_step(&mut self, detected: bool) -> bool {
        let obs = usize::from(detected);
        let prev = self.viterbi;

        let mut next = [0.0f64; 2];
        for (j, slot) in next.iter_mut().enumerate() {
            let best = (prev[PRESENT] * TRANSITION[PRESENT][j])
                .max(prev[ABSENT] * TRANSITION[ABSENT][j]);
            *slot = best * EMISSION[j][obs];
        }

        let total = next[PRESENT] + next[ABSENT];
        if total > 0.0 && total.is_finite() {
            next[PRESENT] /= total;
            next[ABSENT] /= total;
        } else {
            next = PRIOR_UNIFORM;
        }

        self.viterbi = next;
        most_likely_present(&next)
    }
}

/// Arg-max over `[present, absent]`; a tie resolves to Present
#[inline]
fn most_likely_present(v: &[f64; 2]) -> bool {
    v[PRESENT] >= v[ABSENT]
}
