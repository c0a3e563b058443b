//! Burst construction: turns a detonation into streaks, sparks and embers.

use std::f32::consts::TAU;

use tracing::debug;

use super::{Explosion, FireworkSystem, PendingLayer};
use crate::color::{INNER_SHELL, Rgba, firework_hue, random_palette};
use crate::config::BurstWeights;
use crate::math::{Vector3, polar_to_cartesian, random_range};
use crate::particle::{Detonation, EmberInit, ExplodeTrigger, GLYPH_DECAY, Particle, ROCKET_GRAVITY};
use crate::surface::SurfaceProvider;
use crate::trail::{ExplosionTrail, TrailColor, TrailRole};

const LAYER_DELAY: f32 = 0.08;
const LAYER_SHRINK: f32 = 0.3;
const LAYER_SLOWDOWN: f32 = 0.2;
const SPARK_HUE: f32 = 45.0;
const WHISTLE_CHANCE: f32 = 0.3;

const GLYPH_RING_RADIUS: f32 = 100.0;
const GLYPH_FLIGHT_TIME: f32 = 1.2;
const GLYPH_SIZE: f32 = 20.0;

/// How a standard burst lays out its streaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BurstStyle {
    /// One colour, fired as `layers` concentric rings that each carry a
    /// shrinking share of `streaks` and leave a little later than the last.
    Radial { streaks: usize, layers: usize },
    /// White inner shell and coloured outer shell fired together.
    DualShell { inner: usize, outer: usize },
}

impl BurstStyle {
    /// Picks a style by weight with streak counts scaled by `scale`.
    pub fn choose(rng: &mut fastrand::Rng, weights: BurstWeights, scale: f32) -> Self {
        let scaled = |n: usize| ((n as f32 * scale).round() as usize).max(1);
        let total = weights.radial + weights.dual;
        if rng.f32() * total < weights.radial {
            BurstStyle::Radial {
                streaks: scaled(rng.usize(48..=72)),
                layers: rng.usize(2..=3),
            }
        } else {
            BurstStyle::DualShell {
                inner: scaled(rng.usize(24..=32)),
                outer: scaled(rng.usize(40..=56)),
            }
        }
    }

    pub fn streak_count(&self) -> usize {
        match *self {
            BurstStyle::Radial { streaks, layers } => (0..layers).map(|layer| layer_count(streaks, layer)).sum(),
            BurstStyle::DualShell { inner, outer } => inner + outer,
        }
    }
}

fn layer_count(streaks: usize, layer: usize) -> usize {
    let fraction = (1.0 - layer as f32 * LAYER_SHRINK).max(0.1);
    ((streaks as f32 * fraction).round() as usize).max(1)
}

impl<P: SurfaceProvider> FireworkSystem<P> {
    /// Fires a glyph ring when `glyphs` has visible characters, otherwise a
    /// standard burst at `position`.
    pub fn launch_burst(&mut self, position: Vector3, color: Option<Rgba>, glyphs: Option<&str>) {
        if let Some(text) = glyphs.filter(|t| !t.trim().is_empty()) {
            self.launch_glyph_ring(position, color, text);
            return;
        }
        let scale = self.mode.streak_scale();
        let style = BurstStyle::choose(&mut self.rng, self.config.burst_weights, scale);
        self.spawn_burst(position, style, color);
    }

    /// Spawns a standard burst of the given style plus the spark overlay and
    /// pooled glitter every burst carries.
    pub fn spawn_burst(&mut self, position: Vector3, style: BurstStyle, color: Option<Rgba>) {
        self.cue(|audio| audio.play_explosion());
        if self.rng.f32() < WHISTLE_CHANCE {
            self.cue(|audio| audio.play_whistle());
        }

        let base_hue = self.rng.f32() * 360.0;
        match style {
            BurstStyle::Radial { streaks, layers } => self.spawn_radial(position, streaks, layers, base_hue, color),
            BurstStyle::DualShell { inner, outer } => self.spawn_dual_shell(position, inner, outer, color),
        }
        self.spawn_sparks(position);
        self.spawn_glitter(position, color, base_hue);
        self.last_burst = Some(position);

        debug!(?style, %position, streaks = style.streak_count(), "burst");
    }

    fn spawn_radial(&mut self, position: Vector3, streaks: usize, layers: usize, base_hue: f32, color: Option<Rgba>) {
        let trail_color = match color {
            Some(c) => TrailColor::Fixed(c.rgb()),
            None => TrailColor::Sweep { base_hue },
        };
        let reach = self.burst_scale();

        for layer in 0..layers.max(1) {
            let count = layer_count(streaks, layer);
            let slowdown = 1.0 - layer as f32 * LAYER_SLOWDOWN;
            let mut ring = Vec::with_capacity(count);
            for i in 0..count {
                let angle = (i as f32 / count as f32) * TAU + random_range(&mut self.rng, -0.05, 0.05);
                let speed = random_range(&mut self.rng, 90.0, 170.0) * slowdown * reach;
                ring.push(ExplosionTrail::new(
                    TrailRole::Outer,
                    position,
                    polar_to_cartesian(speed, angle),
                    trail_color,
                    &mut self.rng,
                ));
            }

            if layer == 0 {
                self.explosions.extend(ring.into_iter().map(Explosion::Streak));
            } else {
                self.pending.push(PendingLayer {
                    delay: layer as f32 * LAYER_DELAY,
                    streaks: ring,
                });
            }
        }
    }

    fn spawn_dual_shell(&mut self, position: Vector3, inner: usize, outer: usize, color: Option<Rgba>) {
        let outer_color = color.map_or_else(|| random_palette(&mut self.rng), Rgba::rgb);
        let reach = self.burst_scale();

        for i in 0..inner {
            let angle = (i as f32 / inner as f32) * TAU;
            let speed = random_range(&mut self.rng, 50.0, 100.0) * reach;
            let streak = ExplosionTrail::new(
                TrailRole::Inner,
                position,
                polar_to_cartesian(speed, angle),
                TrailColor::Fixed(INNER_SHELL),
                &mut self.rng,
            );
            self.explosions.push(Explosion::Streak(streak));
        }
        for i in 0..outer {
            let angle = (i as f32 / outer as f32) * TAU + random_range(&mut self.rng, -0.12, 0.12);
            let speed = random_range(&mut self.rng, 110.0, 180.0) * reach;
            let streak = ExplosionTrail::new(
                TrailRole::Outer,
                position,
                polar_to_cartesian(speed, angle),
                TrailColor::Fixed(outer_color),
                &mut self.rng,
            );
            self.explosions.push(Explosion::Streak(streak));
        }
    }

    fn spawn_sparks(&mut self, position: Vector3) {
        let count = ((self.rng.usize(16..=24) as f32 * self.mode.streak_scale()).round() as usize).max(1);
        let reach = self.burst_scale();
        for _ in 0..count {
            let angle = self.rng.f32() * TAU;
            let speed = random_range(&mut self.rng, 150.0, 260.0) * reach;
            let spark = ExplosionTrail::new(
                TrailRole::Spark,
                position,
                polar_to_cartesian(speed, angle),
                TrailColor::Jitter { base_hue: SPARK_HUE },
                &mut self.rng,
            );
            self.explosions.push(Explosion::Streak(spark));
        }
    }

    /// Pooled embers thrown out with every burst, bounded by the pool budget.
    fn spawn_glitter(&mut self, position: Vector3, color: Option<Rgba>, base_hue: f32) {
        let wanted = self.rng.usize(20..=30);
        let count = wanted.min(self.pool.headroom());
        let reach = self.burst_scale();

        for i in 0..count {
            let angle = (i as f32 / count as f32) * TAU;
            let speed = random_range(&mut self.rng, 60.0, 140.0) * reach;
            let ember_color = color.unwrap_or_else(|| firework_hue(base_hue + self.rng.f32() * 30.0).with_alpha(1.0));
            let init = EmberInit {
                position,
                velocity: polar_to_cartesian(speed, angle),
                color: ember_color,
                size: random_range(&mut self.rng, 1.5, 2.5),
                decay: random_range(&mut self.rng, 0.015, 0.025),
                glyph: None,
                noise_seed: self.rng.f64() * 1000.0,
            };
            let handle = self.pool.acquire();
            if let Some(ember) = self.pool.get_mut(handle) {
                ember.init(init);
            }
            self.explosions.push(Explosion::Ember(handle));
        }
    }

    /// One rocket per character, each flying out to its slot on a ring around
    /// `center` and bursting into its glyph there.
    fn launch_glyph_ring(&mut self, center: Vector3, color: Option<Rgba>, text: &str) {
        let glyphs: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let step = TAU / glyphs.len() as f32;
        let radius = self.glyph_ring_radius();

        for (index, &glyph) in glyphs.iter().enumerate() {
            let offset = polar_to_cartesian(radius, step * index as f32 - TAU / 4.0);
            let rocket_color = color.unwrap_or_else(|| random_palette(&mut self.rng).with_alpha(1.0));

            let mut rocket = Particle::new(center.x, center.y, true);
            // lands on the ring slot exactly at GLYPH_FLIGHT_TIME under gravity
            rocket.velocity = Vector3::xy(
                offset.x / GLYPH_FLIGHT_TIME,
                offset.y / GLYPH_FLIGHT_TIME - 0.5 * ROCKET_GRAVITY * GLYPH_FLIGHT_TIME,
            );
            rocket.color = rocket_color;
            rocket.glyph = Some(glyph);
            rocket.display_height = self.display_height;
            rocket.trigger = ExplodeTrigger::Timed {
                after: GLYPH_FLIGHT_TIME,
            };
            self.rockets.push(rocket);
        }

        self.cue(|audio| audio.play_launch());
        debug!(%center, text, count = glyphs.len(), "glyph ring launched");
    }

    /// Handles a rocket that left its launch phase this tick.
    pub(super) fn detonate(&mut self, detonation: Detonation) {
        match detonation.glyph {
            Some(glyph) => self.spawn_glyph_ember(detonation, glyph),
            None => self.launch_burst(detonation.position, None, None),
        }
    }

    fn spawn_glyph_ember(&mut self, detonation: Detonation, glyph: char) {
        if self.pool.headroom() == 0 {
            debug!(%glyph, capacity = self.pool.capacity(), "glyph ember skipped: pool budget spent");
            return;
        }
        let color = detonation.color.clamped();
        let init = EmberInit {
            position: detonation.position,
            velocity: Vector3::xy(0.0, -1.0),
            color,
            size: GLYPH_SIZE,
            decay: GLYPH_DECAY,
            glyph: Some(glyph),
            noise_seed: self.rng.f64() * 1000.0,
        };
        let handle = self.pool.acquire();
        if let Some(ember) = self.pool.get_mut(handle) {
            ember.init(init);
            // glyphs drift upward instead of falling
            ember.acceleration = Vector3::ZERO;
        }
        self.explosions.push(Explosion::Ember(handle));
        self.last_burst = Some(detonation.position);
        self.cue(|audio| audio.play_explosion());
    }

    /// Speed multiplier that keeps bursts proportional to the display.
    fn burst_scale(&self) -> f32 {
        if self.display_height > 0.0 {
            (self.display_height / 800.0).clamp(0.15, 1.5)
        } else {
            1.0
        }
    }

    fn glyph_ring_radius(&self) -> f32 {
        let shortest = self.display_width.min(self.display_height);
        if shortest > 0.0 {
            GLYPH_RING_RADIUS.min(shortest * 0.15)
        } else {
            GLYPH_RING_RADIUS
        }
    }
}
