use kurbo::{Affine, Rect};

/// Native composite operations a raster surface is expected to support.
///
/// `SourceOver` is the default painting operator; `DestinationIn` is used by
/// mask compositing. The rest are the separable blend modes that have a
/// one-to-one mapping from [`crate::BlendMode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompositeOp {
    SourceOver,
    DestinationIn,
    Multiply,
    Screen,
    Lighten,
    Darken,
    Difference,
    Overlay,
    HardLight,
}

/// A fill or stroke style as handed to the surface.
///
/// `Packed` carries a 24-bit `0xRRGGBB` color. `Css` carries a literal style
/// string (`#rrggbb`, `rgba(r,g,b,a)`, or anything else the surface may
/// understand); unknown literals pass through color adjustment unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Paint {
    Packed(u32),
    Css(String),
}

impl Paint {
    pub fn rgba(r: u8, g: u8, b: u8, a: f64) -> Self {
        Paint::Css(format!("rgba({r},{g},{b},{a})"))
    }

    /// Decompose into `(r, g, b)` in 0..=255 and alpha in 0..=1.
    ///
    /// Returns `None` for literals this crate cannot parse; callers treat
    /// those as opaque style strings and pass them through.
    pub fn decompose(&self) -> Option<([f64; 3], f64)> {
        match self {
            Paint::Packed(n) => Some((
                [
                    f64::from((n >> 16) & 0xff),
                    f64::from((n >> 8) & 0xff),
                    f64::from(n & 0xff),
                ],
                1.0,
            )),
            Paint::Css(s) => decompose_css(s),
        }
    }
}

fn decompose_css(s: &str) -> Option<([f64; 3], f64)> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        return Some(([f64::from(r), f64::from(g), f64::from(b)], 1.0));
    }
    let body = s.strip_prefix("rgba(")?.strip_suffix(')')?;
    let mut parts = body.split(',').map(str::trim);
    let r = parts.next()?.parse::<f64>().ok()?;
    let g = parts.next()?.parse::<f64>().ok()?;
    let b = parts.next()?.parse::<f64>().ok()?;
    let a = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(([r, g, b], a))
}

/// A snapshot of a surface's pixels: premultiplied RGBA8, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// The raster 2D drawing surface the compositor renders into.
///
/// Modeled on an HTML-canvas-style immediate API: a save/restore stack of
/// graphics state (transform, global alpha, composite op, clip), plus fill,
/// stroke and image-blit primitives. Clip geometry is accumulated with
/// [`Canvas::add_clip_region`] and folded into the active clip with
/// [`Canvas::apply_clip`]; the pending accumulation survives `restore`, the
/// applied clip does not.
pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Resize the backing store. Resizing resets all graphics state and
    /// clears the surface, matching canvas semantics.
    fn resize(&mut self, width: u32, height: u32);

    fn save(&mut self);
    fn restore(&mut self);

    /// Concatenate `t` onto the current transform.
    fn transform(&mut self, t: Affine);
    /// Replace the current transform.
    fn set_transform(&mut self, t: Affine);

    fn global_alpha(&self) -> f64;
    fn set_global_alpha(&mut self, alpha: f64);

    fn set_composite_op(&mut self, op: CompositeOp);

    /// Intersect the active clip with `rect` (in current user space).
    fn clip_rect(&mut self, rect: Rect);
    /// Collapse the active clip to the empty region. Used for nodes with a
    /// degenerate transform, which must render as nothing.
    fn clip_empty(&mut self);

    /// Accumulate `rect` (in current user space) into the pending clip path.
    fn add_clip_region(&mut self, rect: Rect);
    /// Intersect the active clip with the accumulated pending path, then
    /// discard the accumulation. No-op when nothing was accumulated.
    fn apply_clip(&mut self);

    /// Reset every pixel to transparent black, ignoring clip and transform.
    fn clear(&mut self);

    fn fill_rect(&mut self, rect: Rect, paint: &Paint);
    fn stroke_rect(&mut self, rect: Rect, paint: &Paint);

    fn snapshot(&self) -> Image;
    /// Blit `image` at the origin under the current transform, composite op,
    /// alpha and clip.
    fn draw_image(&mut self, image: &Image);

    /// Create an offscreen surface of the same kind. Pooled mask surfaces are
    /// created through this so they always match the destination.
    fn make_compatible(&self, width: u32, height: u32) -> Box<dyn Canvas>;
}
