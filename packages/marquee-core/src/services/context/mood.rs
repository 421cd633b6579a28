//! The mood vector and its smoothed interpolation.

use serde::{Deserialize, Serialize};

/// Seven unit-interval scalars describing ambient context for a location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodVector {
    pub energy: f32,
    pub warmth: f32,
    pub urgency: f32,
    pub density: f32,
    pub tempo: f32,
    pub brightness: f32,
    pub formality: f32,
}

impl Default for MoodVector {
    fn default() -> Self {
        Self {
            energy: 0.5,
            warmth: 0.5,
            urgency: 0.0,
            density: 0.3,
            tempo: 0.5,
            brightness: 0.5,
            formality: 0.5,
        }
    }
}

/// Applies `f` to each of the seven components of `a` paired with `b`.
macro_rules! zip_components {
    ($a:expr, $b:expr, $f:expr) => {{
        let f = $f;
        MoodVector {
            energy: f($a.energy, $b.energy),
            warmth: f($a.warmth, $b.warmth),
            urgency: f($a.urgency, $b.urgency),
            density: f($a.density, $b.density),
            tempo: f($a.tempo, $b.tempo),
            brightness: f($a.brightness, $b.brightness),
            formality: f($a.formality, $b.formality),
        }
    }};
}

impl MoodVector {
    /// Clamps every component to the unit interval.
    #[must_use]
    pub fn clamped(self) -> Self {
        zip_components!(self, self, |a: f32, _| a.clamp(0.0, 1.0))
    }

    /// Moves each component toward `target` by its per-component speed:
    /// `current += (target - current) * speed`.
    ///
    /// Because every speed is in `(0, 1]`, convergence is monotone and
    /// never overshoots, so a jumping target still renders smoothly.
    #[must_use]
    pub fn step_toward(self, target: MoodVector, speeds: LerpSpeeds) -> Self {
        MoodVector {
            energy: lerp(self.energy, target.energy, speeds.energy),
            warmth: lerp(self.warmth, target.warmth, speeds.warmth),
            urgency: lerp(self.urgency, target.urgency, speeds.urgency),
            density: lerp(self.density, target.density, speeds.density),
            tempo: lerp(self.tempo, target.tempo, speeds.tempo),
            brightness: lerp(self.brightness, target.brightness, speeds.brightness),
            formality: lerp(self.formality, target.formality, speeds.formality),
        }
    }

    /// Largest absolute per-component distance to `other`.
    #[must_use]
    pub fn max_delta(self, other: MoodVector) -> f32 {
        let d = zip_components!(self, other, |a: f32, b: f32| (a - b).abs());
        d.energy
            .max(d.warmth)
            .max(d.urgency)
            .max(d.density)
            .max(d.tempo)
            .max(d.brightness)
            .max(d.formality)
    }
}

fn lerp(current: f32, target: f32, speed: f32) -> f32 {
    current + (target - current) * speed
}

/// Per-component interpolation speeds, fractions of the remaining distance
/// covered per 500 ms tick. Warmth drifts; urgency snaps.
#[derive(Debug, Clone, Copy)]
pub struct LerpSpeeds {
    pub energy: f32,
    pub warmth: f32,
    pub urgency: f32,
    pub density: f32,
    pub tempo: f32,
    pub brightness: f32,
    pub formality: f32,
}

impl Default for LerpSpeeds {
    fn default() -> Self {
        Self {
            energy: 0.08,
            warmth: 0.03,
            urgency: 0.30,
            density: 0.10,
            tempo: 0.12,
            brightness: 0.05,
            formality: 0.04,
        }
    }
}
