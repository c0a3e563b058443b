//! Linear colour values in `[0, 1]` and the HSL sweep used by bursts.

/// Firework colours based on the metal salts that produce them.
pub const PALETTE: [Rgb; 10] = [
    Rgb::from_u8(255, 30, 30),   // Strontium (intense red)
    Rgb::from_u8(220, 50, 50),   // Lithium (medium red)
    Rgb::from_u8(255, 140, 0),   // Calcium (orange)
    Rgb::from_u8(255, 220, 0),   // Sodium (yellow)
    Rgb::from_u8(0, 255, 100),   // Barium (green)
    Rgb::from_u8(60, 120, 255),  // Copper halides (blue)
    Rgb::from_u8(100, 100, 255), // Caesium (indigo)
    Rgb::from_u8(180, 50, 255),  // Potassium/Rubidium (violet)
    Rgb::from_u8(255, 200, 50),  // Charcoal/Iron (gold)
    Rgb::from_u8(255, 255, 255), // Titanium/Magnesium (white)
];

/// Magnesium white for the inner shell of a two-shell burst.
pub const INNER_SHELL: Rgb = Rgb::new(1.0, 0.96, 0.88);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    pub const fn with_alpha(self, a: f32) -> Rgba {
        Rgba { r: self.r, g: self.g, b: self.b, a }
    }
}

/// Colour with alpha. Rocket markers may carry channels above 1 as a "hot"
/// cue; [`Rgba::clamped`] brings them back into range before drawing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }

    pub fn with_alpha(self, a: f32) -> Rgba {
        Rgba { a, ..self }
    }

    pub fn clamped(self) -> Rgba {
        Rgba::new(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            self.a.clamp(0.0, 1.0),
        )
    }

    /// 8-bit channels of the clamped colour, alpha dropped.
    pub fn to_u8(self) -> (u8, u8, u8) {
        let c = self.clamped();
        (
            (c.r * 255.0).round() as u8,
            (c.g * 255.0).round() as u8,
            (c.b * 255.0).round() as u8,
        )
    }
}

/// Converts HSL (all components in `[0, 1]`) to linear RGB.
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> Rgb {
    if s == 0.0 {
        return Rgb::new(l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    Rgb::new(
        hue_to_channel(p, q, h + 1.0 / 3.0),
        hue_to_channel(p, q, h),
        hue_to_channel(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_channel(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Saturated firework colour for a hue given in degrees.
pub fn firework_hue(hue_degrees: f32) -> Rgb {
    hsl_to_rgb(hue_degrees.rem_euclid(360.0) / 360.0, 0.8, 0.5)
}

pub fn random_palette(rng: &mut fastrand::Rng) -> Rgb {
    PALETTE[rng.usize(0..PALETTE.len())]
}
