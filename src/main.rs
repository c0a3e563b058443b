use crossterm::{
    cursor::{Hide, Show},
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers, MouseButton, MouseEventKind},
    execute,
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::stdout;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use skyburst::surface::AudioSink;
use skyburst::terminal::{CELL_SCALE, TerminalSurface};
use skyburst::{FireworkConfig, FireworkSystem, Vector3};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const FIXED_DT: f32 = 1.0 / 60.0;
const DEFAULT_TEXT: &str = "HAPPY";

fn print_usage() {
    eprintln!("skyburst - Terminal fireworks");
    eprintln!();
    eprintln!("Usage: skyburst [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --bg-color RRGGBB  Set background color as hex (e.g., --bg-color 1a1b26)");
    eprintln!("  --seed N           Seed the simulation for a repeatable show");
    eprintln!("  --pool N           Ember pool size (500/750/1000 = low/medium/high tier)");
    eprintln!("  --no-follow        Keep the camera still");
    eprintln!("  --turbulence F     Trail roughness, 0 to disable (default 0.4)");
    eprintln!("  --text STR         Characters fired by the 't' key (default {DEFAULT_TEXT})");
    eprintln!("  --log FILE         Write logs to FILE (filter with RUST_LOG)");
    eprintln!();
    eprintln!("Controls: space = light a fuse, t = glyph ring, f = toggle camera follow,");
    eprintln!("          click = burst at cursor");
    eprintln!("Press 'q', ESC, or Ctrl+C to exit");
}

#[derive(Debug, PartialEq)]
struct Options {
    bg_color: (u8, u8, u8),
    config: FireworkConfig,
    text: String,
    log: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            bg_color: (0, 0, 0),
            config: FireworkConfig::default(),
            text: DEFAULT_TEXT.to_string(),
            log: None,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Run(Options),
    Help,
}

fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some((r, g, b))
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut options = Options::default();
    let mut rest = args.iter().skip(1);

    while let Some(arg) = rest.next() {
        let mut value = |flag: &str| rest.next().cloned().ok_or_else(|| format!("{flag} requires a value"));
        match arg.as_str() {
            "--bg-color" => {
                let hex = value("--bg-color")?;
                options.bg_color = parse_hex_color(&hex)
                    .ok_or_else(|| format!("Invalid hex color: {hex}\nExpected format: RRGGBB (e.g., 1a1b26)"))?;
            }
            "--seed" => {
                let seed = value("--seed")?;
                options.config.seed = Some(seed.parse().map_err(|_| format!("Invalid seed: {seed}"))?);
            }
            "--pool" => {
                let size = value("--pool")?;
                options.config.pool_size = size.parse().map_err(|_| format!("Invalid pool size: {size}"))?;
            }
            "--turbulence" => {
                let strength = value("--turbulence")?;
                options.config.turbulence = strength
                    .parse()
                    .map_err(|_| format!("Invalid turbulence: {strength}"))?;
            }
            "--text" => options.text = value("--text")?,
            "--log" => options.log = Some(value("--log")?),
            "--no-follow" => options.config.camera_follow = false,
            "help" | "--help" | "-h" => return Ok(Command::Help),
            other => return Err(format!("Unknown option: {other}")),
        }
    }

    options.config.validate().map_err(|err| err.to_string())?;
    Ok(Command::Run(options))
}

fn init_logging(path: &str) -> std::io::Result<()> {
    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// The terminal has no speaker; cues go to the log.
#[derive(Default)]
struct LoggedAudio {
    volume: f32,
}

impl AudioSink for LoggedAudio {
    fn play_launch(&mut self) {
        debug!(volume = self.volume, "cue: launch");
    }

    fn play_explosion(&mut self) {
        debug!(volume = self.volume, "cue: explosion");
    }

    fn play_whistle(&mut self) {
        debug!(volume = self.volume, "cue: whistle");
    }

    fn play_fuse_loop(&mut self) {
        debug!(volume = self.volume, "cue: fuse loop start");
    }

    fn stop_fuse_loop(&mut self) {
        debug!("cue: fuse loop stop");
    }

    fn set_master_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}

/// Centre of a terminal cell in logical pixels.
fn cell_center(column: u16, row: u16) -> Vector3 {
    Vector3::xy(
        (column as f32 + 0.5) * CELL_SCALE,
        (row as f32 * 2.0 + 1.0) * CELL_SCALE,
    )
}

fn run(options: Options) -> Result<(), Box<dyn Error>> {
    let mut system = FireworkSystem::new(options.config.clone())?;
    system.set_audio_sink(Box::new(LoggedAudio::default()));
    system.set_master_volume(1.0);

    let mut stdout = stdout();
    terminal::enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, Hide, Clear(ClearType::All), EnableMouseCapture)?;

    let result = show(&mut system, &options);

    execute!(stdout, Show, LeaveAlternateScreen, DisableMouseCapture)?;
    terminal::disable_raw_mode()?;
    result
}

fn show(system: &mut FireworkSystem<TerminalSurface>, options: &Options) -> Result<(), Box<dyn Error>> {
    system.init(TerminalSurface::new(options.bg_color))?;

    let mut rng = match options.config.seed {
        Some(seed) => fastrand::Rng::with_seed(seed.wrapping_add(1)),
        None => fastrand::Rng::new(),
    };
    let mut next_launch = 0.0f32;

    let mut last_frame = Instant::now();
    let mut accumulator = 0.0f32;

    loop {
        if event::poll(Duration::from_millis(1))? {
            match event::read()? {
                Event::Key(key) => {
                    if key.code == KeyCode::Char('q')
                        || key.code == KeyCode::Esc
                        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
                    {
                        break;
                    }
                    let (width, height) = system.display_size();
                    match key.code {
                        KeyCode::Char(' ') => {
                            system.ignite_fuse(width * (0.2 + rng.f32() * 0.6));
                        }
                        KeyCode::Char('t') => {
                            let center = Vector3::xy(width / 2.0, height * 0.4);
                            system.launch_burst(center, None, Some(&options.text));
                        }
                        KeyCode::Char('f') => {
                            let follow = !system.camera_follow();
                            system.set_camera_follow(follow);
                            info!(follow, "camera follow toggled");
                        }
                        _ => {}
                    }
                }
                Event::Mouse(mouse) => {
                    if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
                        system.launch_burst(cell_center(mouse.column, mouse.row), None, None);
                    }
                }
                Event::Resize(cols, rows) => {
                    info!(cols, rows, "terminal resized");
                    execute!(stdout(), Clear(ClearType::All))?;
                    system.recover()?;
                }
                _ => {}
            }
        }

        let now = Instant::now();
        let frame_time = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;
        system.record_frame_time(frame_time);

        accumulator += frame_time;
        if accumulator > FIXED_DT * 3.0 {
            accumulator = FIXED_DT * 3.0;
        }

        while accumulator >= FIXED_DT {
            next_launch -= FIXED_DT;
            if next_launch <= 0.0 {
                let (width, height) = system.display_size();
                system.launch(width * (0.1 + rng.f32() * 0.8), height);
                next_launch = 0.3 + rng.f32() * 0.8;
            }
            system.tick(FIXED_DT);
            accumulator -= FIXED_DT;
        }

        if let Err(err) = system.render_frame() {
            error!(%err, "giving up on the display");
            return Err(err.into());
        }
    }

    info!("show over");
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let options = match parse_args(&args) {
        Ok(Command::Run(options)) => options,
        Ok(Command::Help) => {
            print_usage();
            return;
        }
        Err(message) => {
            eprintln!("{message}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Some(path) = &options.log {
        if let Err(err) = init_logging(path) {
            eprintln!("Cannot open log file {path}: {err}");
            std::process::exit(1);
        }
    }

    if let Err(err) = run(options) {
        eprintln!("skyburst: {err}");
        std::process::exit(1);
    }
}
