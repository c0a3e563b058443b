//! The firework display: owns every live rocket and explosion entity and
//! drives them once per frame.
//!
//! Rockets report their burst through the event returned from
//! [`Particle::update`]; bursts are collected during the rocket pass and
//! spawned once it finishes, so the collections are never appended to while
//! they are being walked. Delayed burst layers wait in `pending` until their
//! delay runs out.

mod burst;
mod performance;

pub use burst::BurstStyle;
pub use performance::{FpsMonitor, PerformanceMode};

use tracing::{debug, error, info, trace, warn};

use crate::config::FireworkConfig;
use crate::error::{ConfigError, InitError, RenderError};
use crate::math::{Vector3, random_range};
use crate::particle::{
    ExplodeTrigger, FUSE_ROCKET_TRAIL_LENGTH, Particle, ParticleEvent, ROCKET_GRAVITY, TurbulenceField,
};
use crate::pool::{ObjectPool, PoolHandle};
use crate::surface::{AudioSink, BlendMode, Canvas, Surface, SurfaceProvider};
use crate::trail::ExplosionTrail;

/// Longest step `tick` will integrate; longer gaps are clamped.
pub const MAX_TICK: f32 = 0.1;
const CAMERA_FOLLOW: f32 = 0.1;
/// Used before a surface reports its height.
const ROCKET_LAUNCH_SPEED: f32 = 420.0;
const APEX_MARGIN: f32 = 1.05;
const FUSE_PADDING: f32 = 50.0;
const FUSE_BURN_TIME: f32 = 1.5;
// fraction of display height kept clear above a fuse rocket's burst
const FUSE_TOP_MARGIN: f32 = 0.05;
// px/s toward the centre for a fuse rocket launched right at an edge
const CENTER_PULL: f32 = 12.0;

/// A live entity spawned by a burst.
#[derive(Debug)]
pub enum Explosion {
    Ember(PoolHandle),
    Streak(ExplosionTrail),
}

/// A radial burst layer waiting to be released.
#[derive(Debug)]
struct PendingLayer {
    delay: f32,
    streaks: Vec<ExplosionTrail>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Camera {
    position: Vector3,
    target: Vector3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 100.0),
            target: Vector3::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Fuse {
    x: f32,
    remaining: f32,
}

/// Analytic launch for a fuse rocket: the initial speed is chosen so the rocket
/// has climbed exactly `rise` after `flight_time` seconds under `gravity`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FuseLaunch {
    pub start: Vector3,
    pub rise: f32,
    pub flight_time: f32,
    pub gravity: f32,
    pub horizontal_speed: f32,
}

impl FuseLaunch {
    /// From `rise = v0*T - g*T²/2`.
    pub fn initial_speed(&self) -> f32 {
        (self.rise + 0.5 * self.gravity * self.flight_time * self.flight_time) / self.flight_time
    }

    pub fn target_height(&self) -> f32 {
        self.start.y - self.rise
    }

    pub fn rocket(&self, display_height: f32) -> Particle {
        let mut rocket = Particle::new(self.start.x, self.start.y, true);
        rocket.velocity = Vector3::xy(self.horizontal_speed, -self.initial_speed());
        rocket.acceleration = Vector3::xy(0.0, self.gravity);
        rocket.max_trail_length = FUSE_ROCKET_TRAIL_LENGTH;
        rocket.display_height = display_height;
        rocket.trigger = ExplodeTrigger::Apex {
            target_height: Some(self.target_height()),
        };
        rocket
    }
}

pub struct FireworkSystem<P: SurfaceProvider> {
    config: FireworkConfig,
    provider: Option<P>,
    surface: Option<Surface<P::Canvas>>,
    display_width: f32,
    display_height: f32,
    rockets: Vec<Particle>,
    explosions: Vec<Explosion>,
    pending: Vec<PendingLayer>,
    pool: ObjectPool<Particle>,
    rng: fastrand::Rng,
    turbulence: Option<TurbulenceField>,
    audio: Option<Box<dyn AudioSink>>,
    camera_follow: bool,
    camera: Camera,
    fps: FpsMonitor,
    mode: PerformanceMode,
    fuse: Option<Fuse>,
    last_burst: Option<Vector3>,
}

impl<P: SurfaceProvider> FireworkSystem<P> {
    pub fn new(config: FireworkConfig) -> Result<Self, ConfigError> {
        config
            .validate()
            .inspect_err(|err| warn!(%err, "rejected firework config"))?;

        let mut rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let turbulence =
            (config.turbulence > 0.0).then(|| TurbulenceField::new(rng.u32(..), config.turbulence));

        Ok(Self {
            pool: ObjectPool::new(Particle::default, config.pool_size),
            mode: PerformanceMode::for_pool_size(config.pool_size),
            camera_follow: config.camera_follow,
            config,
            provider: None,
            surface: None,
            display_width: 0.0,
            display_height: 0.0,
            rockets: Vec::new(),
            explosions: Vec::new(),
            pending: Vec::new(),
            rng,
            turbulence,
            audio: None,
            camera: Camera::default(),
            fps: FpsMonitor::new(),
            fuse: None,
            last_burst: None,
        })
    }

    /// Acquires the drawing surface. On failure the system keeps simulating
    /// but renders nothing until a later `recover` succeeds.
    pub fn init(&mut self, provider: P) -> Result<(), InitError> {
        if self.audio.is_none() {
            warn!("no audio sink attached, running silent");
        }
        self.provider = Some(provider);
        self.connect()
    }

    fn connect(&mut self) -> Result<(), InitError> {
        let provider = self
            .provider
            .as_mut()
            .ok_or_else(|| InitError::NoSurface("no surface provider".into()))?;
        let mut surface = provider.acquire()?;
        let metrics = surface.metrics;
        surface.canvas.scale(metrics.pixel_ratio);

        self.display_width = metrics.width;
        self.display_height = metrics.height;
        self.surface = Some(surface);
        info!(
            width = metrics.width,
            height = metrics.height,
            pixel_ratio = metrics.pixel_ratio,
            "render surface ready"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.surface.is_some()
    }

    pub fn set_audio_sink(&mut self, audio: Box<dyn AudioSink>) {
        self.audio = Some(audio);
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        self.cue(|audio| audio.set_master_volume(volume));
    }

    pub fn set_camera_follow(&mut self, follow: bool) {
        self.camera_follow = follow;
    }

    pub fn camera_follow(&self) -> bool {
        self.camera_follow
    }

    pub fn camera_target(&self) -> Vector3 {
        self.camera.target
    }

    pub fn camera_position(&self) -> Vector3 {
        self.camera.position
    }

    pub fn display_size(&self) -> (f32, f32) {
        (self.display_width, self.display_height)
    }

    /// Launches a rocket straight up from `(origin_x, origin_y)`.
    pub fn launch(&mut self, origin_x: f32, origin_y: f32) {
        let jitter = self.config.jitter;
        let (low, high) = self.config.apex_range;

        let speed = if self.display_height > 0.0 {
            (2.0 * ROCKET_GRAVITY * self.display_height * high).sqrt() * APEX_MARGIN
        } else {
            ROCKET_LAUNCH_SPEED
        };
        let vx = random_range(&mut self.rng, -1.0, 1.0) * jitter.horizontal;
        let vy = -(speed + random_range(&mut self.rng, -1.0, 1.0) * jitter.vertical);

        let mut rocket = Particle::new(origin_x, origin_y, true);
        rocket.velocity = Vector3::xy(vx, vy);
        rocket.acceleration = Vector3::xy(0.0, ROCKET_GRAVITY);
        rocket.display_height = self.display_height;
        if self.display_height > 0.0 {
            let fraction = random_range(&mut self.rng, low, high);
            rocket.trigger = ExplodeTrigger::Apex {
                target_height: Some(origin_y - self.display_height * fraction),
            };
        }

        debug!(x = origin_x, y = origin_y, vx, vy, "rocket launched");
        self.rockets.push(rocket);
        self.cue(|audio| audio.play_launch());
    }

    /// Launches a rocket from a burnt-out fuse at `x`, with its base at `y`
    /// (kept at least the edge padding above the bottom). The rocket bursts
    /// 65–85% of the display height above its start, but never closer than 5%
    /// of the height to the top edge. Launch points near an edge are nudged
    /// toward the centre and lean inward. Returns `false` when no surface size
    /// is known yet.
    pub fn launch_from_fuse(&mut self, x: f32, y: f32) -> bool {
        let (width, height) = (self.display_width, self.display_height);
        if width <= 0.0 || height <= 0.0 {
            warn!("fuse launch skipped: display size unknown");
            return false;
        }

        let jitter = self.config.jitter;
        let padding = FUSE_PADDING.min(width * 0.25).min(height * 0.25);
        let mut start_x = x.clamp(padding, width - padding);
        start_x += (self.rng.f32() - 0.5) * 2.0 * jitter.position;
        start_x = start_x.clamp(padding, width - padding);
        let start_y = y.min(height - padding);

        let flight_time = random_range(&mut self.rng, 3.5, 4.5);
        let gravity = random_range(&mut self.rng, 2.3, 2.7);
        let rise = (height * random_range(&mut self.rng, 0.65, 0.85)).min(start_y - height * FUSE_TOP_MARGIN);

        let center = width / 2.0;
        let from_center = (start_x - center) / center;
        start_x -= from_center * padding * 0.5;
        let horizontal_speed = (self.rng.f32() - 0.5) * jitter.horizontal - from_center * CENTER_PULL;

        let plan = FuseLaunch {
            start: Vector3::xy(start_x, start_y),
            rise,
            flight_time,
            gravity,
            horizontal_speed,
        };
        debug!(requested_x = x, start_x, start_y, rise, flight_time, "fuse rocket launched");
        self.rockets.push(plan.rocket(height));
        self.cue(|audio| audio.play_launch());
        true
    }

    /// Lights a fuse at `x` that launches a rocket once it burns down.
    /// Returns `false` if a fuse is already burning.
    pub fn ignite_fuse(&mut self, x: f32) -> bool {
        if self.fuse.is_some() {
            return false;
        }
        self.fuse = Some(Fuse {
            x,
            remaining: FUSE_BURN_TIME,
        });
        self.cue(|audio| audio.play_fuse_loop());
        true
    }

    pub fn fuse_burning(&self) -> bool {
        self.fuse.is_some()
    }

    /// Advances the whole display by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.clamp(0.0, MAX_TICK) } else { 0.0 };

        self.advance_fuse(dt);

        let mut detonations = Vec::new();
        let turbulence = self.turbulence.as_ref();
        self.rockets.retain_mut(|rocket| match rocket.update(dt, turbulence) {
            ParticleEvent::Alive => true,
            ParticleEvent::Exploded(detonation) => {
                detonations.push(detonation);
                false
            }
            ParticleEvent::Retired => false,
        });
        for detonation in detonations {
            self.detonate(detonation);
        }

        let mut released = Vec::new();
        self.pending.retain_mut(|layer| {
            layer.delay -= dt;
            if layer.delay <= 0.0 {
                released.append(&mut layer.streaks);
                false
            } else {
                true
            }
        });
        self.explosions.extend(released.into_iter().map(Explosion::Streak));

        let turbulence = self.turbulence.as_ref();
        let pool = &mut self.pool;
        let rng = &mut self.rng;
        self.explosions.retain_mut(|explosion| match explosion {
            Explosion::Ember(handle) => {
                let alive = pool
                    .get_mut(*handle)
                    .is_some_and(|ember| ember.update(dt, turbulence).is_alive());
                if !alive {
                    pool.release(*handle);
                }
                alive
            }
            Explosion::Streak(streak) => streak.update(dt, rng),
        });

        if self.camera_follow {
            if let Some(target) = self.explosions.last().and_then(|e| self.explosion_position(e)) {
                self.camera.target.lerp(target, CAMERA_FOLLOW);
            }
        }

        trace!(
            rockets = self.rockets.len(),
            explosions = self.explosions.len(),
            pooled = self.pool.active_count(),
            "tick"
        );
    }

    fn advance_fuse(&mut self, dt: f32) {
        let Some(fuse) = self.fuse.as_mut() else {
            return;
        };
        fuse.remaining -= dt;
        if fuse.remaining > 0.0 {
            return;
        }
        let x = fuse.x;
        self.fuse = None;
        self.cue(|audio| audio.stop_fuse_loop());
        self.launch_from_fuse(x, self.display_height);
    }

    fn explosion_position(&self, explosion: &Explosion) -> Option<Vector3> {
        match explosion {
            Explosion::Ember(handle) => self.pool.get(*handle).map(|ember| ember.position),
            Explosion::Streak(streak) => Some(streak.position),
        }
    }

    /// Draws every live entity with additive blending. A failed present
    /// triggers one `recover`; the error is returned only if that fails too.
    pub fn render_frame(&mut self) -> Result<(), RenderError> {
        let Some(surface) = self.surface.as_mut() else {
            return Err(RenderError::NotInitialized);
        };
        let canvas = &mut surface.canvas;

        canvas.clear(self.display_width, self.display_height);
        canvas.set_blend_mode(BlendMode::Lighter);
        for rocket in &self.rockets {
            rocket.render(canvas);
        }
        for explosion in &self.explosions {
            match explosion {
                Explosion::Ember(handle) => {
                    if let Some(ember) = self.pool.get(*handle) {
                        ember.render(canvas);
                    }
                }
                Explosion::Streak(streak) => streak.render(canvas),
            }
        }
        canvas.set_blend_mode(BlendMode::SourceOver);

        let Err(err) = canvas.present() else {
            return Ok(());
        };
        warn!(%err, "frame present failed, recovering surface");
        self.recover()
            .map_err(|init| RenderError::SurfaceLost(format!("{err}; recovery failed: {init}")))
    }

    /// Drops every entity and re-acquires the surface from the last provider.
    pub fn recover(&mut self) -> Result<(), InitError> {
        self.dispose();
        self.surface = None;
        self.camera = Camera::default();
        match self.connect() {
            Ok(()) => {
                info!("render surface recovered");
                Ok(())
            }
            Err(err) => {
                error!(%err, "render surface recovery failed");
                Err(err)
            }
        }
    }

    /// Returns every pooled entity and clears all live collections.
    pub fn dispose(&mut self) {
        self.pool.release_all();
        self.rockets.clear();
        self.explosions.clear();
        self.pending.clear();
        if self.fuse.take().is_some() {
            self.cue(|audio| audio.stop_fuse_loop());
        }
        self.last_burst = None;
    }

    /// Feeds one measured frame time (seconds) into the adaptive budget.
    pub fn record_frame_time(&mut self, frame_time: f32) {
        self.fps.record(frame_time);
        let next = self.fps.recommend(self.mode);
        if next != self.mode {
            warn!(
                fps = self.fps.average_fps().unwrap_or_default(),
                from = %self.mode,
                to = %next,
                "frame rate low, shrinking particle budget"
            );
            self.apply_mode(next);
        }
    }

    /// Switches tier explicitly; the only way back up after a downgrade.
    pub fn set_performance_mode(&mut self, mode: PerformanceMode) {
        if mode != self.mode {
            info!(from = %self.mode, to = %mode, "performance mode set");
            self.apply_mode(mode);
        }
    }

    fn apply_mode(&mut self, mode: PerformanceMode) {
        self.mode = mode;
        self.pool.set_capacity(mode.capacity());
    }

    pub fn performance_mode(&self) -> PerformanceMode {
        self.mode
    }

    pub fn pool_capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn average_fps(&self) -> Option<f32> {
        self.fps.average_fps()
    }

    pub fn rocket_count(&self) -> usize {
        self.rockets.len()
    }

    pub fn rockets(&self) -> &[Particle] {
        &self.rockets
    }

    /// Live explosion entities plus streaks still waiting in delayed layers.
    pub fn explosion_count(&self) -> usize {
        self.explosions.len() + self.pending.iter().map(|l| l.streaks.len()).sum::<usize>()
    }

    pub fn pooled_active_count(&self) -> usize {
        self.pool.active_count()
    }

    /// Where the most recent burst went off.
    pub fn last_burst_position(&self) -> Option<Vector3> {
        self.last_burst
    }

    fn cue(&mut self, play: impl FnOnce(&mut dyn AudioSink)) {
        if let Some(audio) = self.audio.as_deref_mut() {
            play(audio);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;
    use crate::config::LaunchJitter;
    use crate::surface::Headless;
    use crate::surface::testing::{CountingAudio, DrawCall, RecordingProvider};
    use crate::terminal::TerminalSurface;
    use approx::assert_relative_eq;

    const DT: f32 = 1.0 / 60.0;

    fn config() -> FireworkConfig {
        FireworkConfig {
            seed: Some(42),
            jitter: LaunchJitter::none(),
            ..FireworkConfig::default()
        }
    }

    fn headless(width: f32, height: f32) -> FireworkSystem<Headless> {
        let mut system = FireworkSystem::new(config()).unwrap();
        system.init(Headless::new(width, height)).unwrap();
        system
    }

    fn with_audio(system: &mut FireworkSystem<impl SurfaceProvider>) -> CountingAudio {
        let audio = CountingAudio::default();
        system.set_audio_sink(Box::new(audio.clone()));
        audio
    }

    fn tick_until<P: SurfaceProvider>(
        system: &mut FireworkSystem<P>,
        max_ticks: usize,
        done: impl Fn(&FireworkSystem<P>) -> bool,
    ) -> usize {
        for tick in 0..max_ticks {
            if done(system) {
                return tick;
            }
            system.tick(DT);
        }
        panic!("condition not met after {max_ticks} ticks");
    }

    #[test]
    fn rejects_invalid_config() {
        let bad = FireworkConfig {
            pool_size: 0,
            ..FireworkConfig::default()
        };
        assert!(FireworkSystem::<Headless>::new(bad).is_err());
    }

    #[test]
    fn init_failure_is_reported_not_thrown() {
        let provider = RecordingProvider::new(800.0, 600.0);
        *provider.refuse.borrow_mut() = true;
        let mut system = FireworkSystem::new(config()).unwrap();

        assert!(matches!(system.init(provider), Err(InitError::NoSurface(_))));
        assert!(!system.is_initialized());
        assert!(matches!(system.render_frame(), Err(RenderError::NotInitialized)));

        // the simulation still runs without a surface
        system.launch(10.0, 10.0);
        system.tick(DT);
        assert_eq!(system.rocket_count(), 1);
    }

    #[test]
    fn init_scales_canvas_by_pixel_ratio() {
        let provider = RecordingProvider::new(800.0, 600.0);
        let canvas = provider.canvas.clone();
        let mut system = FireworkSystem::new(config()).unwrap();
        system.init(provider).unwrap();

        assert_eq!(canvas.take(), vec![DrawCall::Scale(2.0)]);
        assert_eq!(system.display_size(), (800.0, 600.0));
    }

    #[test]
    fn rocket_bursts_above_its_launch_point() {
        let mut system = headless(1000.0, 1000.0);
        system.launch(500.0, 1000.0);

        tick_until(&mut system, 1000, |s| s.rocket_count() == 0);

        let burst = system.last_burst_position().expect("rocket should have burst");
        assert!(burst.y < 1000.0);
        assert!((0.0..=1000.0).contains(&burst.x));
        assert_eq!(burst.x, 500.0);
        assert!(system.explosion_count() > 0);
    }

    #[test]
    fn one_burst_per_rocket() {
        let mut system = headless(1000.0, 1000.0);
        let audio = with_audio(&mut system);
        system.launch(300.0, 1000.0);
        system.launch(700.0, 1000.0);

        for _ in 0..900 {
            system.tick(DT);
        }
        assert_eq!(audio.count("launch"), 2);
        assert_eq!(audio.count("explosion"), 2);
    }

    #[test]
    fn fuse_launch_reaches_planned_height() {
        let plan = FuseLaunch {
            start: Vector3::xy(500.0, 1000.0),
            rise: 0.75 * 1000.0,
            flight_time: 4.0,
            gravity: 2.5,
            horizontal_speed: 0.0,
        };
        let mut rocket = plan.rocket(1000.0);
        let mut peak = None;
        for _ in 0..600 {
            if let ParticleEvent::Exploded(d) = rocket.update(DT, None) {
                peak = Some(plan.start.y - d.position.y);
                break;
            }
        }
        let peak = peak.expect("fuse rocket never burst");
        assert_relative_eq!(peak, 750.0, max_relative = 0.02);
    }

    #[test]
    fn fuse_rockets_burst_within_band() {
        let mut system = headless(1000.0, 1000.0);
        for x in [10.0, 500.0, 990.0] {
            assert!(system.launch_from_fuse(x, 1000.0));
            let start_y = system.rockets()[0].start_y;
            let start_x = system.rockets()[0].position.x;
            assert!((50.0..=950.0).contains(&start_x));

            tick_until(&mut system, 2000, |s| s.rocket_count() == 0);
            let burst = system.last_burst_position().unwrap();
            let rise = (start_y - burst.y) / 1000.0;
            assert!((0.65 * 0.98..=0.85 * 1.02).contains(&rise), "rise fraction {rise}");
            assert!((0.0..=1000.0).contains(&burst.x));
            system.dispose();
        }
    }

    #[test]
    fn fuse_rockets_lean_toward_centre() {
        let mut system = headless(1000.0, 1000.0);
        system.launch_from_fuse(0.0, 1000.0);
        system.launch_from_fuse(1000.0, 1000.0);
        let rockets = system.rockets();
        assert!(rockets[0].velocity.x > 0.0);
        assert!(rockets[1].velocity.x < 0.0);
    }

    #[test]
    fn fuse_launch_needs_display_size() {
        let mut system = FireworkSystem::<Headless>::new(config()).unwrap();
        assert!(!system.launch_from_fuse(100.0, 100.0));
        assert_eq!(system.rocket_count(), 0);
    }

    #[test]
    fn burning_fuse_launches_once() {
        let mut system = headless(800.0, 600.0);
        let audio = with_audio(&mut system);

        assert!(system.ignite_fuse(400.0));
        assert!(!system.ignite_fuse(100.0));
        assert_eq!(audio.count("fuse"), 1);

        tick_until(&mut system, 200, |s| !s.fuse_burning());
        assert_eq!(audio.count("fuse_stop"), 1);
        assert_eq!(audio.count("launch"), 1);
        assert_eq!(system.rocket_count(), 1);
    }

    #[test]
    fn single_colour_burst_burns_out() {
        let mut system = headless(1000.0, 1000.0);
        system.spawn_burst(
            Vector3::xy(500.0, 400.0),
            BurstStyle::Radial { streaks: 36, layers: 3 },
            Some(Rgba::new(1.0, 0.3, 0.2, 1.0)),
        );
        assert!(system.explosion_count() > BurstStyle::Radial { streaks: 36, layers: 3 }.streak_count());
        assert!(system.pooled_active_count() > 0);

        tick_until(&mut system, 600, |s| s.explosion_count() == 0);
        assert_eq!(system.pooled_active_count(), 0);
    }

    #[test]
    fn delayed_layers_are_released_later() {
        let mut system = headless(1000.0, 1000.0);
        system.spawn_burst(Vector3::xy(500.0, 400.0), BurstStyle::Radial { streaks: 40, layers: 2 }, None);
        let live_before = system.explosions.len();
        let second_ring = BurstStyle::Radial { streaks: 40, layers: 2 }.streak_count() - 40;
        assert_eq!(system.pending.len(), 1);
        assert_eq!(system.explosion_count(), live_before + second_ring);

        let ticks = tick_until(&mut system, 20, |s| s.pending.is_empty());
        assert!(ticks >= 4, "layer released after {ticks} ticks");
        assert_eq!(system.explosions.len(), live_before + second_ring);
    }

    #[test]
    fn dual_shell_uses_both_roles() {
        use crate::trail::TrailRole;

        let mut system = headless(1000.0, 1000.0);
        system.spawn_burst(Vector3::xy(500.0, 400.0), BurstStyle::DualShell { inner: 10, outer: 20 }, None);
        let roles: Vec<TrailRole> = system
            .explosions
            .iter()
            .filter_map(|e| match e {
                Explosion::Streak(s) => Some(s.role),
                Explosion::Ember(_) => None,
            })
            .collect();
        assert_eq!(roles.iter().filter(|r| **r == TrailRole::Inner).count(), 10);
        assert_eq!(roles.iter().filter(|r| **r == TrailRole::Outer).count(), 20);
        assert!(roles.iter().any(|r| *r == TrailRole::Spark));
    }

    #[test]
    fn glitter_respects_pool_budget() {
        let mut system = FireworkSystem::<Headless>::new(FireworkConfig {
            pool_size: 8,
            ..config()
        })
        .unwrap();
        system.init(Headless::new(500.0, 500.0)).unwrap();

        for _ in 0..3 {
            system.launch_burst(Vector3::xy(250.0, 250.0), None, None);
        }
        assert!(system.pooled_active_count() <= 8);
    }

    #[test]
    fn glyph_ring_renders_its_characters() {
        let provider = RecordingProvider::new(1000.0, 1000.0);
        let canvas = provider.canvas.clone();
        let mut system = FireworkSystem::new(config()).unwrap();
        system.init(provider).unwrap();

        system.launch_burst(Vector3::xy(500.0, 500.0), Some(Rgba::new(1.0, 0.8, 0.1, 1.0)), Some("新年"));
        assert_eq!(system.rocket_count(), 2);
        assert!(system.rockets().iter().all(|r| r.glyph.is_some()));

        tick_until(&mut system, 200, |s| s.rocket_count() == 0);
        canvas.take();
        system.render_frame().unwrap();
        let glyphs: Vec<char> = canvas
            .take()
            .into_iter()
            .filter_map(|c| match c {
                DrawCall::Glyph(g) => Some(g),
                _ => None,
            })
            .collect();
        assert_eq!(glyphs.len(), 2);
        assert!(glyphs.contains(&'新') && glyphs.contains(&'年'));
    }

    #[test]
    fn blank_glyph_text_falls_back_to_standard_burst() {
        let mut system = headless(1000.0, 1000.0);
        system.launch_burst(Vector3::xy(500.0, 500.0), None, Some("   "));
        assert_eq!(system.rocket_count(), 0);
        assert!(system.explosion_count() > 0);
    }

    #[test]
    fn render_frame_clears_blends_and_presents() {
        let provider = RecordingProvider::new(400.0, 300.0);
        let canvas = provider.canvas.clone();
        let mut system = FireworkSystem::new(config()).unwrap();
        system.init(provider).unwrap();
        system.launch(200.0, 300.0);
        system.tick(DT);
        canvas.take();

        system.render_frame().unwrap();
        let calls = canvas.take();
        assert_eq!(calls[0], DrawCall::Clear);
        assert_eq!(calls[1], DrawCall::Blend(BlendMode::Lighter));
        assert_eq!(calls.last(), Some(&DrawCall::Present));
        assert!(calls.iter().any(|c| matches!(c, DrawCall::Circle { .. })));
    }

    #[test]
    fn lost_surface_is_recovered() {
        let provider = RecordingProvider::new(400.0, 300.0);
        let canvas = provider.canvas.clone();
        let acquisitions = provider.acquisitions.clone();
        let mut system = FireworkSystem::new(config()).unwrap();
        system.init(provider).unwrap();
        system.launch(200.0, 300.0);

        *canvas.fail_present.borrow_mut() = true;
        assert!(system.render_frame().is_ok());
        assert_eq!(*acquisitions.borrow(), 2);
        assert_eq!(system.rocket_count(), 0);
        assert!(system.is_initialized());
    }

    #[test]
    fn failed_recovery_is_surfaced_once() {
        let provider = RecordingProvider::new(400.0, 300.0);
        let canvas = provider.canvas.clone();
        let refuse = provider.refuse.clone();
        let acquisitions = provider.acquisitions.clone();
        let mut system = FireworkSystem::new(config()).unwrap();
        system.init(provider).unwrap();

        *canvas.fail_present.borrow_mut() = true;
        *refuse.borrow_mut() = true;
        assert!(matches!(system.render_frame(), Err(RenderError::SurfaceLost(_))));
        assert_eq!(*acquisitions.borrow(), 2);
        assert!(matches!(system.render_frame(), Err(RenderError::NotInitialized)));
    }

    #[test]
    fn low_frame_rate_downgrades_pool() {
        let mut system = headless(800.0, 600.0);
        assert_eq!(system.performance_mode(), PerformanceMode::High);

        for _ in 0..60 {
            system.record_frame_time(1.0 / 20.0);
        }
        assert_eq!(system.performance_mode(), PerformanceMode::Low);
        assert_eq!(system.pool_capacity(), 500);
        assert_relative_eq!(system.average_fps().unwrap(), 20.0, max_relative = 1e-4);

        for _ in 0..60 {
            system.record_frame_time(1.0 / 60.0);
        }
        assert_eq!(system.performance_mode(), PerformanceMode::Low);

        system.set_performance_mode(PerformanceMode::High);
        assert_eq!(system.pool_capacity(), 1000);
    }

    #[test]
    fn medium_tier_between_thresholds() {
        let mut system = headless(800.0, 600.0);
        for _ in 0..60 {
            system.record_frame_time(1.0 / 40.0);
        }
        assert_eq!(system.performance_mode(), PerformanceMode::Medium);
        assert_eq!(system.pool_capacity(), 750);
    }

    #[test]
    fn camera_eases_toward_newest_explosion() {
        let mut system = headless(1000.0, 1000.0);
        system.spawn_burst(Vector3::xy(300.0, 200.0), BurstStyle::DualShell { inner: 4, outer: 4 }, None);
        system.tick(DT);
        let first = system.camera_target();
        assert!(first.x > 0.0 && first.x < 60.0);

        for _ in 0..30 {
            system.tick(DT);
        }
        assert!(system.camera_target().x > first.x);
    }

    #[test]
    fn camera_stays_put_when_follow_is_off() {
        let mut system = headless(1000.0, 1000.0);
        system.set_camera_follow(false);
        system.spawn_burst(Vector3::xy(300.0, 200.0), BurstStyle::DualShell { inner: 4, outer: 4 }, None);
        system.tick(DT);
        assert_eq!(system.camera_target(), Vector3::ZERO);
        assert_eq!(system.camera_position(), Vector3::new(0.0, 0.0, 100.0));
    }

    #[test]
    fn dispose_returns_everything() {
        let mut system = headless(1000.0, 1000.0);
        let audio = with_audio(&mut system);
        system.ignite_fuse(500.0);
        system.launch(500.0, 1000.0);
        system.launch_burst(Vector3::xy(500.0, 500.0), None, None);
        system.tick(DT);

        system.dispose();
        assert_eq!(system.rocket_count(), 0);
        assert_eq!(system.explosion_count(), 0);
        assert_eq!(system.pooled_active_count(), 0);
        assert!(!system.fuse_burning());
        assert_eq!(audio.count("fuse_stop"), 1);
    }

    #[test]
    fn bad_dt_is_harmless() {
        let mut system = headless(1000.0, 1000.0);
        system.launch(500.0, 1000.0);
        let before = system.rockets()[0].position;
        system.tick(f32::NAN);
        system.tick(-1.0);
        assert_eq!(system.rockets()[0].position, before);

        system.tick(5.0);
        assert!(system.rockets()[0].position.is_finite());
    }

    #[test]
    fn master_volume_is_clamped() {
        let mut system = headless(100.0, 100.0);
        let audio = with_audio(&mut system);
        system.set_master_volume(1.7);
        assert_eq!(*audio.volume.borrow(), 1.0);
        system.set_master_volume(-0.2);
        assert_eq!(*audio.volume.borrow(), 0.0);
    }

    #[test]
    fn fuse_bursts_stay_on_small_terminals() {
        let metrics = TerminalSurface::metrics_for(80, 24);
        for seed in 0..50 {
            let mut system = FireworkSystem::new(FireworkConfig {
                seed: Some(seed),
                ..FireworkConfig::default()
            })
            .unwrap();
            system.init(Headless { metrics }).unwrap();
            assert!(system.launch_from_fuse(metrics.width / 2.0, metrics.height));

            tick_until(&mut system, 2000, |s| s.rocket_count() == 0);
            let burst = system.last_burst_position().unwrap();
            assert!(burst.y >= 0.0, "seed {seed}: burst at y {}", burst.y);
        }
    }

    #[test]
    fn startup_hitch_does_not_downgrade() {
        let mut system = headless(800.0, 600.0);
        system.record_frame_time(0.05);
        for _ in 0..59 {
            system.record_frame_time(1.0 / 60.0);
        }
        assert_eq!(system.performance_mode(), PerformanceMode::High);
        assert_eq!(system.pool_capacity(), 1000);
    }

    #[test]
    fn faulting_streak_leaves_siblings_alone() {
        let provider = RecordingProvider::new(1000.0, 1000.0);
        let canvas = provider.canvas.clone();
        let mut system = FireworkSystem::new(config()).unwrap();
        system.init(provider).unwrap();
        system.spawn_burst(Vector3::xy(500.0, 400.0), BurstStyle::DualShell { inner: 6, outer: 6 }, None);

        let Explosion::Streak(broken) = &mut system.explosions[0] else {
            panic!("first burst entity should be a streak");
        };
        broken.velocity = Vector3::xy(f32::NAN, 0.0);
        let siblings: Vec<Vector3> = system.explosions[1..]
            .iter()
            .filter_map(|e| system.explosion_position(e))
            .collect();
        let live = system.explosions.len();
        let pooled = system.pooled_active_count();

        system.tick(DT);

        assert_eq!(system.explosions.len(), live - 1);
        assert_eq!(system.pooled_active_count(), pooled);
        let moved: Vec<Vector3> = system
            .explosions
            .iter()
            .filter_map(|e| system.explosion_position(e))
            .collect();
        assert_eq!(moved.len(), siblings.len());
        assert!(moved.iter().zip(&siblings).all(|(now, then)| now != then && now.is_finite()));

        canvas.take();
        system.render_frame().unwrap();
        let drawn = canvas
            .take()
            .iter()
            .filter(|c| matches!(c, DrawCall::Circle { .. } | DrawCall::Segment { .. }))
            .count();
        assert!(drawn > 0);
    }

    #[test]
    fn glyph_embers_respect_pool_budget() {
        let mut system = FireworkSystem::<Headless>::new(FireworkConfig {
            pool_size: 1,
            ..config()
        })
        .unwrap();
        system.init(Headless::new(1000.0, 1000.0)).unwrap();

        system.launch_burst(Vector3::xy(500.0, 500.0), None, Some("ABC"));
        assert_eq!(system.rocket_count(), 3);
        tick_until(&mut system, 200, |s| s.rocket_count() == 0);

        assert_eq!(system.pooled_active_count(), 1);
        assert_eq!(system.explosion_count(), 1);
    }
}
