//! Rockets and free-flying embers.
//!
//! Both share one integrator; `is_rocket` selects the physical constants and
//! whether the entity can burst. Rates ending in `_DECAY`/`_FADE` are per
//! reference frame and are scaled by `dt`, see [`crate::math::per_frame`].

use std::collections::VecDeque;

use noise::{NoiseFn, Perlin};
use tracing::warn;

use crate::color::Rgba;
use crate::error::EntityFault;
use crate::math::{REFERENCE_FPS, Vector3, per_frame};
use crate::pool::Poolable;
use crate::surface::Canvas;

/// Downward pull on a rocket in px/s²: 1.5 px/s of speed gained per reference frame.
pub const ROCKET_GRAVITY: f32 = 1.5 * REFERENCE_FPS;
pub const EMBER_GRAVITY: f32 = 0.8 * REFERENCE_FPS;

pub const ROCKET_DECAY: f32 = 0.0005;
pub const EMBER_DECAY: f32 = 0.015;
pub const GLYPH_DECAY: f32 = 0.01;

pub const ROCKET_TRAIL_LENGTH: usize = 12;
pub const FUSE_ROCKET_TRAIL_LENGTH: usize = 15;
pub const EMBER_TRAIL_LENGTH: usize = 8;

const ROCKET_TRAIL_INTERVAL_MS: f32 = 16.0;
const EMBER_TRAIL_INTERVAL_MS: f32 = 32.0;
// px/s; below this the entity leaves no new trail samples
const MIN_TRAIL_SPEED: f32 = 5.0;
const TRAIL_ALPHA_FADE: f32 = 0.9;
const TRAIL_SIZE_FADE: f32 = 0.95;

const MIN_DRAG: f32 = 0.98;
const DRAG_PER_FRAME_SPEED: f32 = 0.001;
const TURBULENCE_DAMPING: f32 = 0.95;
const FADE_THRESHOLD: f32 = 0.35;

const ROCKET_SIZE: f32 = 2.5;
const EMBER_SIZE: f32 = 2.0;
const ROCKET_COLOR: Rgba = Rgba::new(2.0, 2.0, 2.0, 2.0);

/// Coarse lifecycle stage. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Launch,
    Explode,
    Fade,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrailPoint {
    pub x: f32,
    pub y: f32,
    pub alpha: f32,
    pub size: f32,
}

/// When a rocket stops climbing and bursts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExplodeTrigger {
    /// At the apex, or once it climbs to `target_height` (absolute y, y-down).
    Apex { target_height: Option<f32> },
    /// After a fixed flight time in seconds, whatever its heading.
    Timed { after: f32 },
}

impl Default for ExplodeTrigger {
    fn default() -> Self {
        ExplodeTrigger::Apex {
            target_height: None,
        }
    }
}

/// Everything a burst needs from the rocket that produced it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detonation {
    pub position: Vector3,
    pub velocity: Vector3,
    pub color: Rgba,
    pub glyph: Option<char>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParticleEvent {
    Alive,
    /// Emitted once, on the tick the rocket leaves [`Phase::Launch`].
    Exploded(Detonation),
    Retired,
}

impl ParticleEvent {
    pub fn is_alive(&self) -> bool {
        matches!(self, ParticleEvent::Alive)
    }
}

/// Smooth noise driving the visual roughening of trails.
pub struct TurbulenceField {
    noise: Perlin,
    strength: f32,
}

impl TurbulenceField {
    pub fn new(seed: u32, strength: f32) -> Self {
        Self {
            noise: Perlin::new(seed),
            strength,
        }
    }

    /// Per-frame kick for the entity identified by `seed` at `age` seconds.
    pub fn sample(&self, seed: f64, age: f32) -> (f32, f32) {
        let t = age as f64 * 3.0;
        let nx = self.noise.get([seed, t]) as f32;
        let ny = self.noise.get([seed + 57.31, t]) as f32;
        (nx * self.strength, ny * self.strength)
    }
}

/// Spawn parameters for a pooled ember.
#[derive(Clone, Copy, Debug)]
pub struct EmberInit {
    pub position: Vector3,
    pub velocity: Vector3,
    pub color: Rgba,
    pub size: f32,
    pub decay: f32,
    pub glyph: Option<char>,
    pub noise_seed: f64,
}

#[derive(Clone, Debug)]
pub struct Particle {
    pub position: Vector3,
    pub velocity: Vector3,
    pub acceleration: Vector3,
    pub color: Rgba,
    pub life: f32,
    pub decay: f32,
    pub size: f32,
    pub alpha: f32,
    pub phase: Phase,
    pub is_rocket: bool,
    pub trail: VecDeque<TrailPoint>,
    pub max_trail_length: usize,
    pub trail_interval_ms: f32,
    pub start_y: f32,
    pub display_height: f32,
    pub trigger: ExplodeTrigger,
    pub glyph: Option<char>,
    pub noise_seed: f64,
    trail_clock_ms: f32,
    turbulence: (f32, f32),
    age: f32,
}

impl Default for Particle {
    fn default() -> Self {
        Particle::new(0.0, 0.0, false)
    }
}

impl Particle {
    pub fn new(x: f32, y: f32, is_rocket: bool) -> Self {
        let (gravity, decay, trail_len, interval, size, color) = if is_rocket {
            (
                ROCKET_GRAVITY,
                ROCKET_DECAY,
                ROCKET_TRAIL_LENGTH,
                ROCKET_TRAIL_INTERVAL_MS,
                ROCKET_SIZE,
                ROCKET_COLOR,
            )
        } else {
            (
                EMBER_GRAVITY,
                EMBER_DECAY,
                EMBER_TRAIL_LENGTH,
                EMBER_TRAIL_INTERVAL_MS,
                EMBER_SIZE,
                Rgba::WHITE,
            )
        };

        Self {
            position: Vector3::xy(x, y),
            velocity: Vector3::ZERO,
            acceleration: Vector3::xy(0.0, gravity),
            color,
            life: 1.0,
            decay,
            size,
            alpha: 1.0,
            phase: Phase::Launch,
            is_rocket,
            trail: VecDeque::with_capacity(trail_len),
            max_trail_length: trail_len,
            trail_interval_ms: interval,
            start_y: y,
            display_height: 0.0,
            trigger: ExplodeTrigger::default(),
            glyph: None,
            noise_seed: 0.5,
            trail_clock_ms: 0.0,
            turbulence: (0.0, 0.0),
            age: 0.0,
        }
    }

    /// Prepares a pooled entity for a new flight as an ember.
    pub fn init(&mut self, init: EmberInit) -> &mut Self {
        self.reset();
        self.position = init.position;
        self.start_y = init.position.y;
        self.velocity = init.velocity;
        self.color = init.color;
        self.size = init.size;
        self.decay = init.decay;
        self.glyph = init.glyph;
        self.noise_seed = init.noise_seed;
        self
    }

    pub fn is_dead(&self) -> bool {
        self.life <= 0.0
    }

    /// Trail offset currently applied on top of the physical position.
    pub fn turbulence_offset(&self) -> (f32, f32) {
        self.turbulence
    }

    /// Advances the entity by `dt` seconds. Faults retire the entity instead of
    /// propagating.
    pub fn update(&mut self, dt: f32, turbulence: Option<&TurbulenceField>) -> ParticleEvent {
        match self.step(dt, turbulence) {
            Ok(event) => event,
            Err(fault) => {
                warn!(%fault, rocket = self.is_rocket, "retiring particle after fault");
                self.life = 0.0;
                self.alpha = 0.0;
                ParticleEvent::Retired
            }
        }
    }

    fn step(&mut self, dt: f32, turbulence: Option<&TurbulenceField>) -> Result<ParticleEvent, EntityFault> {
        self.age += dt;

        self.trail_clock_ms += dt * 1000.0;
        if self.trail_clock_ms >= self.trail_interval_ms && self.velocity.length() > MIN_TRAIL_SPEED {
            self.trail_clock_ms = 0.0;
            self.trail.push_front(TrailPoint {
                x: self.position.x + self.turbulence.0,
                y: self.position.y + self.turbulence.1,
                alpha: self.alpha,
                size: self.size,
            });
            self.trail.truncate(self.max_trail_length);
        }
        let alpha_fade = per_frame(TRAIL_ALPHA_FADE, dt);
        let size_fade = per_frame(TRAIL_SIZE_FADE, dt);
        for point in &mut self.trail {
            point.alpha *= alpha_fade;
            point.size *= size_fade;
        }

        // Semi-implicit Euler
        self.velocity += self.acceleration * dt;
        self.position += self.velocity * dt;

        if !self.is_rocket {
            let frame_speed = self.velocity.length() / REFERENCE_FPS;
            let drag = (1.0 - frame_speed * DRAG_PER_FRAME_SPEED).max(MIN_DRAG);
            self.velocity *= per_frame(drag, dt);
        }

        if !self.velocity.is_finite() {
            return Err(self.fault("velocity"));
        }
        if !self.position.is_finite() {
            return Err(self.fault("position"));
        }

        self.life -= self.decay * dt * REFERENCE_FPS;
        self.alpha = self.life.max(0.0).min(self.alpha);

        let mut event = if self.life > 0.0 {
            ParticleEvent::Alive
        } else {
            ParticleEvent::Retired
        };

        if self.phase == Phase::Launch {
            if self.is_rocket {
                if self.should_explode() {
                    self.phase = Phase::Explode;
                    event = ParticleEvent::Exploded(Detonation {
                        position: self.position,
                        velocity: self.velocity,
                        color: self.color,
                        glyph: self.glyph,
                    });
                }
            } else if self.life < FADE_THRESHOLD {
                self.phase = Phase::Fade;
            }
        }

        if let Some(field) = turbulence {
            let (kx, ky) = field.sample(self.noise_seed, self.age);
            let damping = per_frame(TURBULENCE_DAMPING, dt);
            self.turbulence.0 = (self.turbulence.0 + kx * dt * REFERENCE_FPS) * damping;
            self.turbulence.1 = (self.turbulence.1 + ky * dt * REFERENCE_FPS) * damping;
            if !self.turbulence.0.is_finite() || !self.turbulence.1.is_finite() {
                return Err(self.fault("turbulence offset"));
            }
        }

        Ok(event)
    }

    fn should_explode(&self) -> bool {
        match self.trigger {
            ExplodeTrigger::Apex { target_height } => {
                self.velocity.y >= 0.0 || target_height.is_some_and(|target| self.position.y <= target)
            }
            ExplodeTrigger::Timed { after } => self.age >= after,
        }
    }

    fn fault(&self, quantity: &'static str) -> EntityFault {
        EntityFault::NonFinite {
            entity: if self.is_rocket { "rocket" } else { "ember" },
            quantity,
        }
    }

    pub fn render<C: Canvas + ?Sized>(&self, canvas: &mut C) {
        if self.alpha <= 0.0 {
            return;
        }
        let color = self.color.clamped();

        if !self.is_rocket {
            if let Some(glyph) = self.glyph {
                canvas.fill_glyph(self.position.x, self.position.y, glyph, self.size, color.with_alpha(self.alpha));
                return;
            }
        }

        for point in self.trail.iter().rev() {
            if point.alpha > 0.01 {
                canvas.fill_circle(point.x, point.y, point.size * 0.6, color.with_alpha(point.alpha * 0.6));
            }
        }

        // shadow-blur stand-in
        canvas.fill_circle(
            self.position.x,
            self.position.y,
            self.size * 2.0,
            color.with_alpha(self.alpha * 0.25),
        );
        canvas.fill_circle(self.position.x, self.position.y, self.size, color.with_alpha(self.alpha));
    }
}

impl Poolable for Particle {
    fn reset(&mut self) {
        self.position.set(0.0, 0.0, 0.0);
        self.velocity.set(0.0, 0.0, 0.0);
        self.acceleration.set(0.0, EMBER_GRAVITY, 0.0);
        self.color = Rgba::WHITE;
        self.life = 1.0;
        self.decay = EMBER_DECAY;
        self.size = EMBER_SIZE;
        self.alpha = 1.0;
        self.phase = Phase::Launch;
        self.is_rocket = false;
        self.trail.clear();
        self.max_trail_length = EMBER_TRAIL_LENGTH;
        self.trail_interval_ms = EMBER_TRAIL_INTERVAL_MS;
        self.start_y = 0.0;
        self.display_height = 0.0;
        self.trigger = ExplodeTrigger::default();
        self.glyph = None;
        self.noise_seed = 0.5;
        self.trail_clock_ms = 0.0;
        self.turbulence = (0.0, 0.0);
        self.age = 0.0;
    }
}
