//! Explosion streaks.
//!
//! A streak is one physically simulated spark whose recent positions are kept
//! as a short history and drawn as a tapered stroke. The history exists only
//! for rendering; the physics runs on `position`/`velocity` alone.

use std::collections::VecDeque;

use tracing::warn;

use crate::color::{Rgb, firework_hue};
use crate::error::EntityFault;
use crate::math::{REFERENCE_FPS, Vector3, per_frame};
use crate::surface::Canvas;

const SAMPLE_ALPHA_FADE: f32 = 0.89;
const SAMPLE_SIZE_FADE: f32 = 0.91;
const SLOW_DAMPING: f32 = 0.95;
const HUE_SPREAD: f32 = 30.0;

/// Physical and stroke constants for one streak role.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoleProfile {
    /// px/s²
    pub gravity: f32,
    /// Velocity kept per reference frame.
    pub air_resistance: f32,
    /// px/s; slower streaks get extra damping.
    pub min_speed: f32,
    pub decay: f32,
    pub max_particles: usize,
    pub start_width: f32,
    pub end_width: f32,
    pub glow_width: f32,
    pub glow_alpha: f32,
    pub halo: bool,
    pub sample_size: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrailRole {
    /// Bright, short-lived flash debris.
    Spark,
    /// Shorter, brighter, thicker shell.
    Inner,
    /// Longer, wider-spread shell that thickens toward its tail.
    Outer,
}

impl TrailRole {
    pub const fn profile(self) -> RoleProfile {
        match self {
            TrailRole::Spark => RoleProfile {
                gravity: 120.0,
                air_resistance: 0.96,
                min_speed: 20.0,
                decay: 0.03,
                max_particles: 4,
                start_width: 1.6,
                end_width: 0.4,
                glow_width: 2.5,
                glow_alpha: 0.35,
                halo: true,
                sample_size: 1.5,
            },
            TrailRole::Inner => RoleProfile {
                gravity: 60.0,
                air_resistance: 0.97,
                min_speed: 12.0,
                decay: 0.016,
                max_particles: 6,
                start_width: 3.0,
                end_width: 1.2,
                glow_width: 2.2,
                glow_alpha: 0.3,
                halo: false,
                sample_size: 2.5,
            },
            TrailRole::Outer => RoleProfile {
                gravity: 50.0,
                air_resistance: 0.975,
                min_speed: 10.0,
                decay: 0.012,
                max_particles: 10,
                start_width: 1.0,
                end_width: 2.2,
                glow_width: 2.0,
                glow_alpha: 0.25,
                halo: false,
                sample_size: 2.0,
            },
        }
    }
}

/// Where a streak's colour comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrailColor {
    /// Exact colour, used by the two-shell bursts.
    Fixed(Rgb),
    /// One hue picked within 30° above `base_hue` (degrees) at spawn.
    Sweep { base_hue: f32 },
    /// Re-rolled around `base_hue` for every history sample.
    Jitter { base_hue: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreakSample {
    pub position: Vector3,
    pub size: f32,
    pub alpha: f32,
    pub color: Rgb,
}

#[derive(Clone, Debug)]
pub struct ExplosionTrail {
    pub position: Vector3,
    pub velocity: Vector3,
    pub role: TrailRole,
    pub life: f32,
    profile: RoleProfile,
    color: TrailColor,
    base_color: Rgb,
    // newest first
    particles: VecDeque<StreakSample>,
}

impl ExplosionTrail {
    pub fn new(
        role: TrailRole,
        position: Vector3,
        velocity: Vector3,
        color: TrailColor,
        rng: &mut fastrand::Rng,
    ) -> Self {
        let profile = role.profile();
        let base_color = match color {
            TrailColor::Fixed(rgb) => rgb,
            TrailColor::Sweep { base_hue } => firework_hue(base_hue + rng.f32() * HUE_SPREAD),
            TrailColor::Jitter { base_hue } => firework_hue(base_hue),
        };

        Self {
            position,
            velocity,
            role,
            life: 1.0,
            profile,
            color,
            base_color,
            particles: VecDeque::with_capacity(profile.max_particles + 1),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.life.max(0.0)
    }

    pub fn samples(&self) -> impl ExactSizeIterator<Item = &StreakSample> {
        self.particles.iter()
    }

    pub fn is_dead(&self) -> bool {
        self.life <= 0.0
    }

    /// Advances the streak; `false` once it has burned out or faulted.
    pub fn update(&mut self, dt: f32, rng: &mut fastrand::Rng) -> bool {
        match self.step(dt, rng) {
            Ok(alive) => alive,
            Err(fault) => {
                warn!(%fault, role = ?self.role, "retiring streak after fault");
                self.life = 0.0;
                false
            }
        }
    }

    fn step(&mut self, dt: f32, rng: &mut fastrand::Rng) -> Result<bool, EntityFault> {
        let p = self.profile;

        self.velocity.y += p.gravity * dt;
        self.velocity *= per_frame(p.air_resistance, dt);
        if self.velocity.length() < p.min_speed {
            self.velocity *= per_frame(SLOW_DAMPING, dt);
        }
        self.position += self.velocity * dt;

        if !self.velocity.is_finite() || !self.position.is_finite() {
            return Err(EntityFault::NonFinite {
                entity: "streak",
                quantity: "motion",
            });
        }

        let alpha_fade = per_frame(SAMPLE_ALPHA_FADE, dt);
        let size_fade = per_frame(SAMPLE_SIZE_FADE, dt);
        for sample in &mut self.particles {
            sample.alpha *= alpha_fade;
            sample.size *= size_fade;
        }

        let color = match self.color {
            TrailColor::Jitter { base_hue } => {
                firework_hue(base_hue + (rng.f32() - 0.5) * HUE_SPREAD)
            }
            _ => self.base_color,
        };
        self.particles.push_front(StreakSample {
            position: self.position,
            size: p.sample_size * self.life,
            alpha: self.life,
            color,
        });
        self.particles.truncate(p.max_particles);

        self.life -= p.decay * dt * REFERENCE_FPS;
        Ok(self.life > 0.0)
    }

    /// Glow stroke underneath a core stroke tapering from `start_width` at the
    /// head to `end_width` at the tail; sparks add a faint halo below both.
    pub fn render<C: Canvas + ?Sized>(&self, canvas: &mut C) {
        let p = &self.profile;
        let count = self.particles.len();
        if count == 0 {
            return;
        }
        if count == 1 {
            let s = &self.particles[0];
            canvas.fill_circle(s.position.x, s.position.y, s.size, s.color.with_alpha(s.alpha));
            return;
        }

        let segments = count - 1;
        let width_at = |i: usize| {
            let t = if segments > 1 {
                i as f32 / (segments - 1) as f32
            } else {
                0.0
            };
            p.start_width + (p.end_width - p.start_width) * t
        };
        let segment = |i: usize| {
            let a = &self.particles[i];
            let b = &self.particles[i + 1];
            ((a.position.x, a.position.y), (b.position.x, b.position.y), a)
        };

        if p.halo {
            for i in 0..segments {
                let (from, to, s) = segment(i);
                canvas.stroke_segment(from, to, width_at(i) * 4.0, s.color.with_alpha(s.alpha * 0.08));
            }
        }
        for i in 0..segments {
            let (from, to, s) = segment(i);
            canvas.stroke_segment(
                from,
                to,
                width_at(i) * p.glow_width,
                s.color.with_alpha(s.alpha * p.glow_alpha),
            );
        }
        for i in 0..segments {
            let (from, to, s) = segment(i);
            canvas.stroke_segment(from, to, width_at(i), s.color.with_alpha(s.alpha));
        }
    }
}
