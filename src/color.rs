use crate::canvas::{Canvas, Paint};

/// Tolerance used when classifying a composed transform. Repeated composition
/// of per-node deltas accumulates floating-point drift; anything within this
/// band of the identity still takes the cheap paths.
pub const CLASSIFY_EPSILON: f64 = 1e-4;

/// How much work a composed color transform implies for a consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorClass {
    /// No visible adjustment; skip entirely.
    Identity,
    /// Only the alpha multiplier differs from identity; expressible through
    /// the surface's global alpha.
    AlphaOnly,
    /// Arbitrary multiply/offset; fill and stroke colors must be resolved
    /// per style.
    General,
}

/// A per-node color adjustment delta, as declared on a scene node.
///
/// Multipliers are fixed-point with 256 meaning 1.0 (the scene format's
/// convention); offsets are in channel units (-255..=255).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColorAdjust {
    pub mul: [f64; 4],
    pub off: [f64; 4],
}

impl ColorAdjust {
    pub fn identity() -> Self {
        Self {
            mul: [256.0; 4],
            off: [0.0; 4],
        }
    }

    /// Pure-opacity delta: alpha multiplier in 0..=1, everything else identity.
    pub fn alpha(alpha: f64) -> Self {
        Self {
            mul: [256.0, 256.0, 256.0, alpha * 256.0],
            off: [0.0; 4],
        }
    }
}

/// An immutable composed color transform: RGBA scale plus offset, accumulated
/// along the root-to-node path.
///
/// Multipliers here are unit-scale (1.0 = identity); deltas are rescaled from
/// their fixed-point form during [`ColorTransform::compose`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorTransform {
    mul: [f64; 4],
    off: [f64; 4],
    class: ColorClass,
}

impl Default for ColorTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl ColorTransform {
    pub fn identity() -> Self {
        Self {
            mul: [1.0; 4],
            off: [0.0; 4],
            class: ColorClass::Identity,
        }
    }

    pub fn class(&self) -> ColorClass {
        self.class
    }

    pub fn alpha_multiplier(&self) -> f64 {
        self.mul[3]
    }

    /// Compose this transform with a node's delta. Pure: returns the child's
    /// effective transform, leaving `self` untouched.
    ///
    /// Offsets do not commute: the parent offset is scaled by the child
    /// multiplier before the child offset is added, so the fold along any
    /// ancestor path is associative.
    pub fn compose(&self, delta: &ColorAdjust) -> ColorTransform {
        let mut mul = [0.0; 4];
        let mut off = [0.0; 4];
        for i in 0..4 {
            let m = delta.mul[i] / 256.0;
            mul[i] = self.mul[i] * m;
            off[i] = self.off[i] * m + delta.off[i];
        }
        let class = classify(&mul, &off);
        ColorTransform { mul, off, class }
    }

    /// Resolve a fill or stroke style under this transform.
    ///
    /// `General` transforms decompose parseable colors, apply
    /// `clamp(c * mul + off)` per channel and re-encode as an `rgba()`
    /// literal; unparseable literals pass through unchanged. Otherwise packed
    /// colors are encoded as `#rrggbb` and literals pass through.
    pub fn resolve_paint(&self, style: &Paint) -> Paint {
        if self.class != ColorClass::General {
            return match style {
                Paint::Packed(n) => Paint::Css(format!("#{:06x}", n & 0xff_ff_ff)),
                other => other.clone(),
            };
        }

        let Some((rgb, a)) = style.decompose() else {
            return style.clone();
        };

        let r = (rgb[0] * self.mul[0] + self.off[0]).clamp(0.0, 255.0) as u8;
        let g = (rgb[1] * self.mul[1] + self.off[1]).clamp(0.0, 255.0) as u8;
        let b = (rgb[2] * self.mul[2] + self.off[2]).clamp(0.0, 255.0) as u8;
        let a = (a * self.mul[3] + self.off[3] / 256.0).clamp(0.0, 1.0);
        Paint::rgba(r, g, b, a)
    }

    /// Fold this transform's alpha multiplier into the surface's global
    /// alpha.
    ///
    /// Applies only when classified `AlphaOnly`, or unconditionally with
    /// `force` — the escape hatch for compositing a layer that has no other
    /// way to express alpha (e.g. a cached bitmap under a `General`
    /// transform).
    pub fn apply_alpha(&self, canvas: &mut dyn Canvas, force: bool) {
        if self.class == ColorClass::AlphaOnly || force {
            let alpha = (canvas.global_alpha() * self.mul[3]).clamp(0.0, 1.0);
            canvas.set_global_alpha(alpha);
        }
    }
}

fn classify(mul: &[f64; 4], off: &[f64; 4]) -> ColorClass {
    let near = |v: f64, target: f64| (v - target).abs() < CLASSIFY_EPSILON;
    if near(mul[0], 1.0)
        && near(mul[1], 1.0)
        && near(mul[2], 1.0)
        && mul[3] >= 0.0
        && off.iter().all(|&o| near(o, 0.0))
    {
        if near(mul[3], 1.0) {
            ColorClass::Identity
        } else {
            ColorClass::AlphaOnly
        }
    } else {
        ColorClass::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas_cpu::CpuCanvas;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < CLASSIFY_EPSILON
    }

    #[test]
    fn identity_classifies_as_identity() {
        assert_eq!(ColorTransform::identity().class(), ColorClass::Identity);
    }

    #[test]
    fn alpha_only_delta_classifies_as_alpha_only() {
        let t = ColorTransform::identity().compose(&ColorAdjust::alpha(0.5));
        assert_eq!(t.class(), ColorClass::AlphaOnly);
        assert!(approx(t.alpha_multiplier(), 0.5));
    }

    #[test]
    fn offsets_force_general() {
        let delta = ColorAdjust {
            mul: [256.0; 4],
            off: [40.0, 0.0, 0.0, 0.0],
        };
        let t = ColorTransform::identity().compose(&delta);
        assert_eq!(t.class(), ColorClass::General);
    }

    #[test]
    fn composition_is_associative_along_a_path() {
        let c1 = ColorAdjust {
            mul: [128.0, 256.0, 64.0, 200.0],
            off: [10.0, -5.0, 0.0, 12.0],
        };
        let c2 = ColorAdjust {
            mul: [256.0, 100.0, 256.0, 128.0],
            off: [0.0, 30.0, -8.0, 0.0],
        };

        let stepwise = ColorTransform::identity().compose(&c1).compose(&c2);

        // Direct two-step composition starting from a non-identity parent.
        let parent = ColorTransform::identity().compose(&c1);
        let direct = parent.compose(&c2);

        for i in 0..4 {
            assert!(approx(stepwise.mul[i], direct.mul[i]));
            assert!(approx(stepwise.off[i], direct.off[i]));
        }
    }

    #[test]
    fn drifted_identity_still_classifies_as_identity() {
        let t = ColorTransform {
            mul: [1.0 + 5e-5, 1.0 - 5e-5, 1.0, 1.0 + 9e-5],
            off: [5e-5, -5e-5, 0.0, 0.0],
            class: classify(&[1.0 + 5e-5, 1.0 - 5e-5, 1.0, 1.0 + 9e-5], &[5e-5, -5e-5, 0.0, 0.0]),
        };
        assert_eq!(t.class(), ColorClass::Identity);
    }

    #[test]
    fn resolve_packed_under_identity_is_hex_literal() {
        let t = ColorTransform::identity();
        assert_eq!(
            t.resolve_paint(&Paint::Packed(0x00ff07)),
            Paint::Css("#00ff07".to_string())
        );
    }

    #[test]
    fn resolve_under_general_applies_multiply_and_offset() {
        let delta = ColorAdjust {
            mul: [128.0, 256.0, 256.0, 256.0],
            off: [0.0, 100.0, 0.0, 0.0],
        };
        let t = ColorTransform::identity().compose(&delta);
        let resolved = t.resolve_paint(&Paint::Packed(0xff0000));
        // r: 255 * 0.5 = 127; g: 0 + 100; b: 0; a: 1
        assert_eq!(resolved, Paint::Css("rgba(127,100,0,1)".to_string()));
    }

    #[test]
    fn resolve_clamps_out_of_range_channels() {
        let delta = ColorAdjust {
            mul: [512.0, 256.0, 256.0, 256.0],
            off: [0.0, -300.0, 0.0, 0.0],
        };
        let t = ColorTransform::identity().compose(&delta);
        let resolved = t.resolve_paint(&Paint::Packed(0xc8c8c8));
        assert_eq!(resolved, Paint::Css("rgba(255,0,200,1)".to_string()));
    }

    #[test]
    fn resolve_passes_unknown_literals_through() {
        let delta = ColorAdjust {
            mul: [128.0; 4],
            off: [0.0; 4],
        };
        let t = ColorTransform::identity().compose(&delta);
        let style = Paint::Css("radial-gradient".to_string());
        assert_eq!(t.resolve_paint(&style), style);
    }

    #[test]
    fn apply_alpha_multiplies_surface_alpha_when_alpha_only() {
        let t = ColorTransform::identity().compose(&ColorAdjust::alpha(0.5));
        let mut canvas = CpuCanvas::new(1, 1);
        canvas.set_global_alpha(0.8);
        t.apply_alpha(&mut canvas, false);
        assert!(approx(canvas.global_alpha(), 0.4));
    }

    #[test]
    fn apply_alpha_is_noop_for_general_unless_forced() {
        let delta = ColorAdjust {
            mul: [128.0, 256.0, 256.0, 128.0],
            off: [0.0; 4],
        };
        let t = ColorTransform::identity().compose(&delta);
        let mut canvas = CpuCanvas::new(1, 1);

        t.apply_alpha(&mut canvas, false);
        assert!(approx(canvas.global_alpha(), 1.0));

        t.apply_alpha(&mut canvas, true);
        assert!(approx(canvas.global_alpha(), 0.5));
    }
}
