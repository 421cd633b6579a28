//! Target-vector computation from a signal bag.
//!
//! Contributions are additive and order-independent: a baseline from the
//! time of day, adjustments from weather, audio, occupancy and people
//! count, then a clamp to the unit interval. Security levels 2-3 act as a
//! staged override pinned after everything else, so no ambient signal can
//! soften an emergency.

use super::mood::MoodVector;
use super::signals::{SignalBag, TimePeriod};

/// Computes the target mood for one location's signal bag.
#[must_use]
pub fn compute_target(signals: &SignalBag) -> MoodVector {
    let mut mood = MoodVector::default();

    apply_time(&mut mood, signals);
    apply_weather(&mut mood, signals);
    apply_audio(&mut mood, signals);
    apply_occupancy(&mut mood, signals);
    apply_people_count(&mut mood, signals);
    mood = mood.clamped();

    apply_security_override(&mut mood, signals);
    mood.clamped()
}

/// Time-of-day baselines and the weekend adjustment.
fn apply_time(mood: &mut MoodVector, signals: &SignalBag) {
    let (energy, tempo, brightness, warmth) = match signals.time.period {
        TimePeriod::Dawn => (0.3, 0.3, 0.35, 0.6),
        TimePeriod::Morning => (0.6, 0.55, 0.7, 0.5),
        TimePeriod::Midday => (0.7, 0.6, 0.8, 0.5),
        TimePeriod::Afternoon => (0.6, 0.55, 0.7, 0.5),
        TimePeriod::GoldenHour => (0.5, 0.45, 0.55, 0.7),
        TimePeriod::Evening => (0.4, 0.35, 0.35, 0.6),
        TimePeriod::Night => (0.15, 0.15, 0.15, 0.5),
    };
    mood.energy = energy;
    mood.tempo = tempo;
    mood.brightness = brightness;
    mood.warmth = warmth;

    if signals.time.is_weekend {
        mood.formality -= 0.15;
        mood.energy -= 0.05;
    }
}

fn apply_weather(mood: &mut MoodVector, signals: &SignalBag) {
    let Some(ref weather) = signals.weather else {
        return;
    };

    match weather.condition.as_str() {
        "sunny" | "clear" => {
            mood.brightness += 0.2;
            mood.warmth += 0.15;
            mood.energy += 0.1;
        }
        "cloudy" | "overcast" => {
            mood.brightness -= 0.1;
            mood.energy -= 0.05;
        }
        "rain" | "drizzle" => {
            mood.brightness -= 0.15;
            mood.tempo -= 0.1;
            mood.density += 0.05;
        }
        "storm" | "thunderstorm" => {
            mood.brightness -= 0.2;
            mood.tempo += 0.1;
            mood.density += 0.1;
        }
        "snow" => {
            mood.brightness += 0.1;
            mood.tempo -= 0.15;
            mood.warmth -= 0.1;
        }
        _ => {}
    }

    // Temperature extremes dominate the condition adjustments.
    if weather.temp_c > 25.0 {
        mood.warmth = mood.warmth.max(0.9);
        mood.energy -= 0.1;
    } else if weather.temp_c < 5.0 {
        mood.warmth += 0.2;
    }
}

fn apply_audio(mood: &mut MoodVector, signals: &SignalBag) {
    let Some(audio) = signals.audio else {
        return;
    };
    mood.energy += audio.level * 0.3;
    mood.tempo += audio.spike_freq * 0.3;
    if audio.sustained_loud {
        mood.density += 0.15;
    }
}

fn apply_occupancy(mood: &mut MoodVector, signals: &SignalBag) {
    let Some(occupancy) = signals.occupancy else {
        return;
    };
    if occupancy < 0.2 {
        mood.density -= 0.15;
    } else if occupancy > 0.7 {
        mood.density += 0.2;
        mood.formality += 0.1;
        if occupancy > 0.9 {
            mood.urgency += 0.2;
        }
    }
}

fn apply_people_count(mood: &mut MoodVector, signals: &SignalBag) {
    let Some(count) = signals.people_count else {
        return;
    };
    let n = (count as f32 / 20.0).min(1.0);
    mood.density += 0.15 * n;
    mood.energy += 0.10 * n;
}

/// Security levels 2-3 pin the vector to emergency values; level 3
/// additionally saturates urgency, energy and tempo.
fn apply_security_override(mood: &mut MoodVector, signals: &SignalBag) {
    let level = signals.security_level.unwrap_or(0);
    if level >= 2 {
        mood.warmth = 0.0;
        mood.brightness = 1.0;
        mood.energy = 0.8;
        mood.tempo = 0.8;
        mood.formality = 1.0;
        mood.urgency = mood.urgency.max(0.7);
    }
    if level >= 3 {
        mood.urgency = 1.0;
        mood.energy = 1.0;
        mood.tempo = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::context::signals::{
        AudioSignals, Season, TimeSignals, WeatherSignals,
    };

    fn midday_weekday() -> TimeSignals {
        TimeSignals {
            hour: 12.0,
            weekday: 1,
            is_weekend: false,
            period: TimePeriod::Midday,
            season: Season::Summer,
        }
    }

    fn in_unit_interval(mood: &MoodVector) -> bool {
        [
            mood.energy,
            mood.warmth,
            mood.urgency,
            mood.density,
            mood.tempo,
            mood.brightness,
            mood.formality,
        ]
        .iter()
        .all(|v| (0.0..=1.0).contains(v))
    }

    #[test]
    fn night_baseline_dims_everything() {
        let mut bag = SignalBag::with_time(midday_weekday());
        bag.time.period = TimePeriod::Night;
        let mood = compute_target(&bag);
        assert_eq!(mood.brightness, 0.15);
        assert_eq!(mood.energy, 0.15);
        assert_eq!(mood.tempo, 0.15);
    }

    #[test]
    fn weekend_softens_formality() {
        let mut bag = SignalBag::with_time(midday_weekday());
        bag.time.is_weekend = true;
        let weekend = compute_target(&bag);
        let weekday = compute_target(&SignalBag::with_time(midday_weekday()));
        assert!((weekday.formality - weekend.formality - 0.15).abs() < 1e-6);
        assert!(weekend.energy < weekday.energy);
    }

    #[test]
    fn sunny_hot_midday_scenario() {
        // Weather sunny at 28°C, midday weekday: warmth and brightness
        // saturate high, the hot rule trims energy after the additions.
        let mut bag = SignalBag::with_time(midday_weekday());
        bag.weather = Some(WeatherSignals {
            condition: "sunny".into(),
            temp_c: 28.0,
        });
        let mood = compute_target(&bag);

        assert!(mood.warmth >= 0.9);
        assert!(mood.brightness >= 0.9);
        // Midday baseline 0.7 + sunny 0.1 - hot 0.1.
        assert!((mood.energy - 0.7).abs() < 1e-6);
        assert!(in_unit_interval(&mood));
    }

    #[test]
    fn cold_weather_adds_warmth() {
        let mut bag = SignalBag::with_time(midday_weekday());
        bag.weather = Some(WeatherSignals {
            condition: "snow".into(),
            temp_c: -2.0,
        });
        let mood = compute_target(&bag);
        // Baseline 0.5 - snow 0.1 + cold 0.2.
        assert!((mood.warmth - 0.6).abs() < 1e-6);
    }

    #[test]
    fn audio_drives_energy_and_tempo() {
        let mut bag = SignalBag::with_time(midday_weekday());
        bag.audio = Some(AudioSignals {
            level: 1.0,
            spike_freq: 0.5,
            sustained_loud: true,
        });
        let quiet = compute_target(&SignalBag::with_time(midday_weekday()));
        let loud = compute_target(&bag);
        assert!(loud.energy >= quiet.energy + 0.29);
        assert!((loud.tempo - quiet.tempo - 0.15).abs() < 1e-6);
        assert!((loud.density - quiet.density - 0.15).abs() < 1e-6);
    }

    #[test]
    fn occupancy_stages() {
        let base = compute_target(&SignalBag::with_time(midday_weekday()));

        let mut sparse = SignalBag::with_time(midday_weekday());
        sparse.occupancy = Some(0.1);
        assert!(compute_target(&sparse).density < base.density);

        let mut busy = SignalBag::with_time(midday_weekday());
        busy.occupancy = Some(0.8);
        let busy_mood = compute_target(&busy);
        assert!(busy_mood.density > base.density);
        assert!(busy_mood.formality > base.formality);
        assert_eq!(busy_mood.urgency, 0.0);

        let mut packed = SignalBag::with_time(midday_weekday());
        packed.occupancy = Some(0.95);
        assert!(compute_target(&packed).urgency > 0.0);
    }

    #[test]
    fn people_count_normalises_at_twenty() {
        let mut few = SignalBag::with_time(midday_weekday());
        few.people_count = Some(10);
        let mut many = SignalBag::with_time(midday_weekday());
        many.people_count = Some(200);

        let base = compute_target(&SignalBag::with_time(midday_weekday()));
        let few_mood = compute_target(&few);
        let many_mood = compute_target(&many);

        assert!((few_mood.density - base.density - 0.075).abs() < 1e-6);
        // Saturates at count/20 == 1.
        assert!((many_mood.density - base.density - 0.15).abs() < 1e-6);
    }

    #[test]
    fn security_three_overrides_everything() {
        // Pile every warm, calm signal on and confirm the override wins.
        let mut bag = SignalBag::with_time(midday_weekday());
        bag.weather = Some(WeatherSignals {
            condition: "sunny".into(),
            temp_c: 30.0,
        });
        bag.occupancy = Some(0.1);
        bag.security_level = Some(3);

        let mood = compute_target(&bag);
        assert_eq!(mood.urgency, 1.0);
        assert_eq!(mood.warmth, 0.0);
        assert_eq!(mood.energy, 1.0);
        assert_eq!(mood.tempo, 1.0);
        assert_eq!(mood.brightness, 1.0);
        assert_eq!(mood.formality, 1.0);
    }

    #[test]
    fn security_two_pins_without_saturating() {
        let mut bag = SignalBag::with_time(midday_weekday());
        bag.security_level = Some(2);
        let mood = compute_target(&bag);
        assert_eq!(mood.warmth, 0.0);
        assert_eq!(mood.brightness, 1.0);
        assert!(mood.urgency >= 0.7);
        assert!(mood.energy < 1.0);
    }

    #[test]
    fn all_signals_stay_in_unit_interval() {
        let mut bag = SignalBag::with_time(midday_weekday());
        bag.weather = Some(WeatherSignals {
            condition: "sunny".into(),
            temp_c: 40.0,
        });
        bag.audio = Some(AudioSignals {
            level: 1.0,
            spike_freq: 1.0,
            sustained_loud: true,
        });
        bag.occupancy = Some(1.0);
        bag.people_count = Some(500);
        assert!(in_unit_interval(&compute_target(&bag)));
    }
}
