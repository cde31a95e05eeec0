//! Sass colors.
//!
//! A color is stored in whichever representation it was built from (RGB
//! or HSL); the other representation is derived on first request and
//! cached. Equality and hashing always go through canonical RGBA so that
//! `hsl(0, 100%, 50%)` and `rgb(255, 0, 0)` are one value.

use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use super::hash_f64;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColorRepr {
    Rgb {
        red: u8,
        green: u8,
        blue: u8,
        alpha: f64,
    },
    Hsl {
        hue: f64,
        saturation: f64,
        lightness: f64,
        alpha: f64,
    },
}

#[derive(Debug)]
pub struct SassColor {
    repr: ColorRepr,
    derived: OnceLock<ColorRepr>,
}

impl SassColor {
    pub fn from_rgba(red: u8, green: u8, blue: u8, alpha: f64) -> Self {
        Self {
            repr: ColorRepr::Rgb {
                red,
                green,
                blue,
                alpha: alpha.clamp(0.0, 1.0),
            },
            derived: OnceLock::new(),
        }
    }

    pub fn from_hsla(hue: f64, saturation: f64, lightness: f64, alpha: f64) -> Self {
        Self {
            repr: ColorRepr::Hsl {
                hue: hue.rem_euclid(360.0),
                saturation: saturation.clamp(0.0, 100.0),
                lightness: lightness.clamp(0.0, 100.0),
                alpha: alpha.clamp(0.0, 1.0),
            },
            derived: OnceLock::new(),
        }
    }

    /// Whether the stored representation is HSL. The wire encoding sends
    /// whichever representation the color carries.
    pub fn is_hsl(&self) -> bool {
        matches!(self.repr, ColorRepr::Hsl { .. })
    }

    /// Canonical RGBA channels. Derives and caches when the color is
    /// stored as HSL.
    pub fn rgba(&self) -> (u8, u8, u8, f64) {
        match self.repr {
            ColorRepr::Rgb {
                red,
                green,
                blue,
                alpha,
            } => (red, green, blue, alpha),
            ColorRepr::Hsl {
                hue,
                saturation,
                lightness,
                alpha,
            } => {
                let derived = self.derived.get_or_init(|| {
                    let (red, green, blue) = hsl_to_rgb(hue, saturation, lightness);
                    ColorRepr::Rgb {
                        red,
                        green,
                        blue,
                        alpha,
                    }
                });
                match *derived {
                    ColorRepr::Rgb {
                        red,
                        green,
                        blue,
                        alpha,
                    } => (red, green, blue, alpha),
                    ColorRepr::Hsl { .. } => unreachable!("derived repr mirrors the stored one"),
                }
            }
        }
    }

    /// HSLA channels: hue in degrees, saturation and lightness in
    /// percent. Derives and caches when the color is stored as RGB.
    pub fn hsla(&self) -> (f64, f64, f64, f64) {
        match self.repr {
            ColorRepr::Hsl {
                hue,
                saturation,
                lightness,
                alpha,
            } => (hue, saturation, lightness, alpha),
            ColorRepr::Rgb {
                red,
                green,
                blue,
                alpha,
            } => {
                let derived = self.derived.get_or_init(|| {
                    let (hue, saturation, lightness) = rgb_to_hsl(red, green, blue);
                    ColorRepr::Hsl {
                        hue,
                        saturation,
                        lightness,
                        alpha,
                    }
                });
                match *derived {
                    ColorRepr::Hsl {
                        hue,
                        saturation,
                        lightness,
                        alpha,
                    } => (hue, saturation, lightness, alpha),
                    ColorRepr::Rgb { .. } => unreachable!("derived repr mirrors the stored one"),
                }
            }
        }
    }

    pub fn alpha(&self) -> f64 {
        match self.repr {
            ColorRepr::Rgb { alpha, .. } | ColorRepr::Hsl { alpha, .. } => alpha,
        }
    }

    /// Replaces the alpha channel, keeping the stored representation
    /// exactly as it is (no round trip through RGBA).
    pub fn with_alpha(&self, alpha: f64) -> Self {
        let alpha = alpha.clamp(0.0, 1.0);
        let repr = match self.repr {
            ColorRepr::Rgb {
                red, green, blue, ..
            } => ColorRepr::Rgb {
                red,
                green,
                blue,
                alpha,
            },
            ColorRepr::Hsl {
                hue,
                saturation,
                lightness,
                ..
            } => ColorRepr::Hsl {
                hue,
                saturation,
                lightness,
                alpha,
            },
        };
        Self {
            repr,
            derived: OnceLock::new(),
        }
    }

    pub fn with_red(&self, red: u8) -> Self {
        let (_, green, blue, alpha) = self.rgba();
        Self::from_rgba(red, green, blue, alpha)
    }

    pub fn with_green(&self, green: u8) -> Self {
        let (red, _, blue, alpha) = self.rgba();
        Self::from_rgba(red, green, blue, alpha)
    }

    pub fn with_blue(&self, blue: u8) -> Self {
        let (red, green, _, alpha) = self.rgba();
        Self::from_rgba(red, green, blue, alpha)
    }

    pub fn with_hue(&self, hue: f64) -> Self {
        let (_, saturation, lightness, alpha) = self.hsla();
        Self::from_hsla(hue, saturation, lightness, alpha)
    }

    pub fn with_saturation(&self, saturation: f64) -> Self {
        let (hue, _, lightness, alpha) = self.hsla();
        Self::from_hsla(hue, saturation, lightness, alpha)
    }

    pub fn with_lightness(&self, lightness: f64) -> Self {
        let (hue, saturation, _, alpha) = self.hsla();
        Self::from_hsla(hue, saturation, lightness, alpha)
    }
}

impl Clone for SassColor {
    fn clone(&self) -> Self {
        let derived = OnceLock::new();
        if let Some(cached) = self.derived.get() {
            let _ = derived.set(*cached);
        }
        Self {
            repr: self.repr,
            derived,
        }
    }
}

impl PartialEq for SassColor {
    fn eq(&self, other: &Self) -> bool {
        self.rgba() == other.rgba()
    }
}

impl Hash for SassColor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (red, green, blue, alpha) = self.rgba();
        red.hash(state);
        green.hash(state);
        blue.hash(state);
        hash_f64(alpha, state);
    }
}

fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> (u8, u8, u8) {
    let h = hue.rem_euclid(360.0);
    let s = (saturation / 100.0).clamp(0.0, 1.0);
    let l = (lightness / 100.0).clamp(0.0, 1.0);

    let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let h_prime = h / 60.0;
    let x = chroma * (1.0 - (h_prime % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match h_prime {
        h if h < 1.0 => (chroma, x, 0.0),
        h if h < 2.0 => (x, chroma, 0.0),
        h if h < 3.0 => (0.0, chroma, x),
        h if h < 4.0 => (0.0, x, chroma),
        h if h < 5.0 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = l - chroma / 2.0;

    let scale = |channel: f64| ((channel + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (scale(r1), scale(g1), scale(b1))
}

fn rgb_to_hsl(red: u8, green: u8, blue: u8) -> (f64, f64, f64) {
    let r = f64::from(red) / 255.0;
    let g = f64::from(green) / 255.0;
    let b = f64::from(blue) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0;

    if max == min {
        return (0.0, 0.0, lightness * 100.0);
    }

    let delta = max - min;
    let saturation = if lightness > 0.5 {
        delta / (2.0 - max - min)
    } else {
        delta / (max + min)
    };

    let hue = if max == r {
        (g - b) / delta + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };

    (hue * 60.0, saturation * 100.0, lightness * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(color: &SassColor) -> u64 {
        let mut hasher = DefaultHasher::new();
        color.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn rgb_and_hsl_forms_of_one_color_are_equal() {
        let cases = [
            (SassColor::from_rgba(255, 0, 0, 1.0), SassColor::from_hsla(0.0, 100.0, 50.0, 1.0)),
            (SassColor::from_rgba(0, 0, 255, 1.0), SassColor::from_hsla(240.0, 100.0, 50.0, 1.0)),
            (SassColor::from_rgba(0, 0, 0, 1.0), SassColor::from_hsla(0.0, 0.0, 0.0, 1.0)),
            (SassColor::from_rgba(255, 255, 255, 0.5), SassColor::from_hsla(0.0, 0.0, 100.0, 0.5)),
            (SassColor::from_rgba(128, 128, 128, 1.0), SassColor::from_hsla(0.0, 0.0, 50.2, 1.0)),
        ];
        for (rgb, hsl) in cases {
            assert_eq!(rgb, hsl);
            assert_eq!(hash_of(&rgb), hash_of(&hsl));
        }
    }

    #[test]
    fn hsl_round_trips_through_rgba() {
        let color = SassColor::from_rgba(255, 0, 0, 1.0);
        let (hue, saturation, lightness, alpha) = color.hsla();
        assert_eq!((hue, saturation, lightness, alpha), (0.0, 100.0, 50.0, 1.0));
    }

    #[test]
    fn alpha_change_preserves_stored_representation() {
        let color = SassColor::from_hsla(33.3, 40.1, 60.9, 1.0);
        let faded = color.with_alpha(0.25);
        assert!(faded.is_hsl());
        let (hue, saturation, lightness, alpha) = faded.hsla();
        assert_eq!((hue, saturation, lightness), (33.3, 40.1, 60.9));
        assert_eq!(alpha, 0.25);
    }

    #[test]
    fn channel_change_rederives_canonical_rgba() {
        let color = SassColor::from_hsla(0.0, 100.0, 50.0, 1.0);
        let shifted = color.with_blue(255);
        assert!(!shifted.is_hsl());
        assert_eq!(shifted.rgba(), (255, 0, 255, 1.0));

        let rehued = SassColor::from_rgba(255, 0, 0, 0.5).with_hue(240.0);
        assert!(rehued.is_hsl());
        assert_eq!(rehued.rgba(), (0, 0, 255, 0.5));
    }

    #[test]
    fn alpha_is_clamped() {
        assert_eq!(SassColor::from_rgba(1, 2, 3, 7.0).alpha(), 1.0);
        assert_eq!(SassColor::from_rgba(1, 2, 3, -1.0).alpha(), 0.0);
    }

    #[test]
    fn hue_wraps_around() {
        let wrapped = SassColor::from_hsla(480.0, 100.0, 50.0, 1.0);
        let plain = SassColor::from_hsla(120.0, 100.0, 50.0, 1.0);
        assert_eq!(wrapped, plain);
    }

    #[test]
    fn clone_keeps_cached_derivation() {
        let color = SassColor::from_hsla(210.0, 60.0, 40.0, 1.0);
        let rgba = color.rgba();
        let cloned = color.clone();
        assert_eq!(cloned.rgba(), rgba);
        assert!(cloned.is_hsl());
    }
}
