//! Anomaly gate: decides whether a freshly synthesized spectrogram is
//! worth transmitting, using energy and band-ratio heuristics with
//! consecutive-hit hysteresis and a post-emission cooldown.

use std::time::{Duration, Instant};
use wire::{Grid, GRID_DIM};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Demo,
    Production,
}

#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    pub profile: Profile,
    pub consecutive_hits: u32,
    pub cooldown: Duration,
    /// Only consulted in `Production`; `Demo`'s threshold is relative to
    /// the running peak energy observed so far.
    pub production_energy_threshold: f64,
}

impl GateConfig {
    pub fn demo() -> Self {
        Self {
            profile: Profile::Demo,
            consecutive_hits: 4,
            cooldown: Duration::from_secs(10),
            production_energy_threshold: 0.40,
        }
    }

    pub fn production() -> Self {
        Self {
            profile: Profile::Production,
            consecutive_hits: 4,
            cooldown: Duration::from_secs(30),
            production_energy_threshold: 0.40,
        }
    }
}

const HIT_WINDOW: Duration = Duration::from_secs(3);
const HIGH_BAND_ROWS: std::ops::Range<usize> = 0..8;
const MID_BAND_ROWS: std::ops::Range<usize> = 8..24;
const LOW_BAND_ROWS: std::ops::Range<usize> = 24..32;

struct BandEnergies {
    low: f64,
    mid: f64,
    high: f64,
    total: f64,
}

fn band_energies(grid: &Grid) -> BandEnergies {
    let sum = |rows: std::ops::Range<usize>| -> f64 {
        rows.map(|r| grid.row(r).iter().map(|&p| p as f64).sum::<f64>())
            .sum()
    };
    let low = sum(LOW_BAND_ROWS);
    let mid = sum(MID_BAND_ROWS);
    let high = sum(HIGH_BAND_ROWS);
    BandEnergies {
        low,
        mid,
        high,
        total: (low + mid + high).max(f64::EPSILON),
    }
}

/// Coefficient of variation of per-frame (per-column) energy.
fn frame_energy_cv(grid: &Grid) -> f64 {
    let frame_energies: Vec<f64> = (0..GRID_DIM)
        .map(|col| (0..GRID_DIM).map(|row| grid.get(row, col) as f64).sum::<f64>())
        .collect();
    let mean = frame_energies.iter().sum::<f64>() / frame_energies.len() as f64;
    if mean <= f64::EPSILON {
        return 0.0;
    }
    let variance = frame_energies
        .iter()
        .map(|e| (e - mean).powi(2))
        .sum::<f64>()
        / frame_energies.len() as f64;
    variance.sqrt() / mean
}

fn criteria_met(profile: Profile, grid: &Grid, running_max_energy: f64, config: &GateConfig) -> bool {
    let bands = band_energies(grid);
    let total_fraction_of_max = if running_max_energy > f64::EPSILON {
        bands.total / running_max_energy
    } else {
        1.0
    };
    let cv = frame_energy_cv(grid);

    match profile {
        Profile::Demo => {
            let high_ratio = bands.high / bands.total;
            total_fraction_of_max > 0.80 && high_ratio > 0.22 && cv < 0.05 && bands.high >= bands.low
        }
        Profile::Production => {
            let low_ratio = bands.low / bands.total;
            let mid_ratio = bands.mid / bands.total;
            let high_ratio = bands.high / bands.total;
            total_fraction_of_max > config.production_energy_threshold
                && low_ratio > 0.20 // also satisfies the broadband low>0.15 requirement
                && mid_ratio > 0.30
                && high_ratio > 0.10
                && cv < 0.3
        }
    }
}

/// Hysteresis state machine over consecutive gate hits.
pub struct AnomalyGate {
    config: GateConfig,
    consecutive_hits: u32,
    window_start: Option<Instant>,
    running_max_energy: f64,
    cooldown_until: Option<Instant>,
    last_fire_confidence: u8,
}

impl AnomalyGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            consecutive_hits: 0,
            window_start: None,
            running_max_energy: 0.0,
            cooldown_until: None,
            last_fire_confidence: 0,
        }
    }

    /// Feed one window's grid at time `now`. Returns `true` exactly when
    /// an anomaly should be transmitted.
    pub fn evaluate(&mut self, grid: &Grid, now: Instant) -> bool {
        let bands = band_energies(grid);
        self.running_max_energy = self.running_max_energy.max(bands.total);

        if let Some(until) = self.cooldown_until {
            if now < until {
                return false;
            }
            self.cooldown_until = None;
        }

        let hit = criteria_met(self.config.profile, grid, self.running_max_energy, &self.config);

        if !hit {
            self.consecutive_hits = 0;
            self.window_start = None;
            return false;
        }

        match self.window_start {
            Some(start) if now.duration_since(start) <= HIT_WINDOW => {
                self.consecutive_hits += 1;
            }
            _ => {
                self.window_start = Some(now);
                self.consecutive_hits = 1;
            }
        }

        if self.consecutive_hits >= self.config.consecutive_hits {
            self.consecutive_hits = 0;
            self.window_start = None;
            self.cooldown_until = Some(now + self.config.cooldown);
            let fraction = (bands.total / self.running_max_energy).clamp(0.0, 1.0);
            self.last_fire_confidence = (fraction * 100.0).round() as u8;
            true
        } else {
            false
        }
    }

    /// Confidence estimate (0..100) attached to the most recent firing,
    /// carried in the `SPEC_END` packet's `conf` field.
    pub fn last_fire_confidence(&self) -> u8 {
        self.last_fire_confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production_grid(low: u8, mid: u8, high: u8) -> Grid {
        let mut grid = Grid::zeroed();
        for row in LOW_BAND_ROWS {
            for col in 0..GRID_DIM {
                grid.set(row, col, low);
            }
        }
        for row in MID_BAND_ROWS {
            for col in 0..GRID_DIM {
                grid.set(row, col, mid);
            }
        }
        for row in HIGH_BAND_ROWS {
            for col in 0..GRID_DIM {
                grid.set(row, col, high);
            }
        }
        grid
    }

    #[test]
    fn fires_after_consecutive_hits_then_cools_down() {
        let mut gate = AnomalyGate::new(GateConfig::production());
        let grid = production_grid(80, 100, 50); // low~0.24, mid~0.61, high~0.15 of total
        let base = Instant::now();

        let mut fired_at = None;
        for i in 0..4u32 {
            let now = base + Duration::from_millis(i as u64 * 100);
            if gate.evaluate(&grid, now) {
                fired_at = Some(i);
            }
        }
        assert_eq!(fired_at, Some(3), "fires on the 4th consecutive hit");

        // Still within cooldown: a 5th hit must not fire again.
        let now = base + Duration::from_millis(500);
        assert!(!gate.evaluate(&grid, now));
    }

    #[test]
    fn non_hit_resets_the_counter() {
        let mut gate = AnomalyGate::new(GateConfig::production());
        let hit = production_grid(80, 100, 50);
        let quiet = Grid::zeroed();
        let base = Instant::now();

        assert!(!gate.evaluate(&hit, base));
        assert!(!gate.evaluate(&hit, base + Duration::from_millis(100)));
        assert!(!gate.evaluate(&quiet, base + Duration::from_millis(200)));
        assert!(!gate.evaluate(&hit, base + Duration::from_millis(300)));
        assert!(!gate.evaluate(&hit, base + Duration::from_millis(400)));
        assert!(!gate.evaluate(&hit, base + Duration::from_millis(500)));
        // only 3 consecutive hits accumulated since the reset; no fire yet
    }

    #[test]
    fn hits_outside_sliding_window_do_not_accumulate() {
        let mut gate = AnomalyGate::new(GateConfig::production());
        let hit = production_grid(80, 100, 50);
        let base = Instant::now();

        assert!(!gate.evaluate(&hit, base));
        assert!(!gate.evaluate(&hit, base + Duration::from_secs(4))); // outside 3s window, resets
        assert!(!gate.evaluate(&hit, base + Duration::from_secs(4) + Duration::from_millis(100)));
        assert!(!gate.evaluate(&hit, base + Duration::from_secs(4) + Duration::from_millis(200)));
        assert!(gate.evaluate(&hit, base + Duration::from_secs(4) + Duration::from_millis(300)));
    }
}
