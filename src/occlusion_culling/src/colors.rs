//! Accuracy-to-color mapping for visible point display.

/// RGBA color with values in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorRGBA {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Convert a normalized value in [0, 1] to an RGBA color.
///
/// Smooth ramp from blue (low) through cyan, green and yellow to red (high):
/// - [0.0, 0.25]: Blue → Cyan (G increases)
/// - [0.25, 0.5]: Cyan → Green (B decreases)
/// - [0.5, 0.75]: Green → Yellow (R increases)
/// - [0.75, 1.0]: Yellow → Red (G decreases)
pub fn value_to_color(normalized: f32) -> ColorRGBA {
    let value = if normalized.is_nan() {
        0.0
    } else {
        normalized.clamp(0.0, 0.9999)
    };

    let (r, g, b) = if value < 0.25 {
        let t = value * 4.0;
        (0.0, (t * std::f32::consts::FRAC_PI_2).sin(), 1.0)
    } else if value < 0.5 {
        let t = (value - 0.25) * 4.0;
        (0.0, 1.0, (t * std::f32::consts::FRAC_PI_2).cos())
    } else if value < 0.75 {
        let t = (value - 0.5) * 4.0;
        ((t * std::f32::consts::FRAC_PI_2).sin(), 1.0, 0.0)
    } else {
        let t = (value - 0.75) * 4.0;
        (1.0, (t * std::f32::consts::FRAC_PI_2).cos(), 0.0)
    };

    ColorRGBA { r, g, b, a: 0.999 }
}

/// Color an accuracy score within `[lower, upper]`.
///
/// High accuracy maps to green-blue, poor accuracy to red. A collapsed
/// range maps to the middle of the ramp.
pub fn accuracy_to_color(accuracy: f64, lower: f64, upper: f64) -> ColorRGBA {
    let range = upper - lower;
    let normalized = if range > 0.0 {
        (accuracy - lower) / range
    } else {
        0.5
    };
    value_to_color((1.0 - normalized) as f32)
}

/// Pack RGB into a single u32, `0x00RRGGBB`.
pub fn color_to_rgb_packed(color: &ColorRGBA) -> u32 {
    let r = (color.r * 255.0) as u32;
    let g = (color.g * 255.0) as u32;
    let b = (color.b * 255.0) as u32;
    (r << 16) | (g << 8) | b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_to_color_range() {
        let blue = value_to_color(0.0);
        assert!(blue.b > 0.9, "Low value should be blue");
        assert!(blue.r < 0.1, "Low value should have no red");

        let red = value_to_color(0.99);
        assert!(red.r > 0.9, "High value should be red");
        assert!(red.b < 0.1, "High value should have no blue");

        let mid = value_to_color(0.5);
        assert!(mid.g > 0.9, "Mid value should have high green");

        assert_eq!(value_to_color(f32::NAN), value_to_color(0.0));
    }

    #[test]
    fn test_accuracy_to_color() {
        // Best accuracy is cold, worst is hot.
        let best = accuracy_to_color(1.0, 0.0, 1.0);
        assert!(best.b > 0.9);
        let worst = accuracy_to_color(0.0, 0.0, 1.0);
        assert!(worst.r > 0.9);

        let collapsed = accuracy_to_color(0.3, 0.3, 0.3);
        assert!(collapsed.g > 0.9);
    }

    #[test]
    fn test_color_to_rgb_packed() {
        let red = ColorRGBA {
            r: 1.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        };
        assert_eq!(color_to_rgb_packed(&red), 0x00FF0000);

        let green = ColorRGBA {
            r: 0.0,
            g: 1.0,
            b: 0.0,
            a: 1.0,
        };
        assert_eq!(color_to_rgb_packed(&green), 0x0000FF00);
    }
}
