use kurbo::{Affine, Point, Rect};

use crate::canvas::{Canvas, CompositeOp, Image, Paint};

const DEGENERATE_EPSILON: f64 = 1e-12;

/// Software implementation of [`Canvas`] over premultiplied RGBA8 pixels.
///
/// Coverage is computed per pixel center by inverse-mapping through the
/// current transform, so arbitrary affine fills and blits work without a
/// tessellator. Intended for offscreen mask surfaces, tests and headless
/// output rather than as a performance-oriented rasterizer.
pub struct CpuCanvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
    state: GfxState,
    saved: Vec<GfxState>,
    pending_clip: Option<Vec<u8>>,
}

#[derive(Clone)]
struct GfxState {
    transform: Affine,
    alpha: f64,
    op: CompositeOp,
    /// Per-pixel coverage; `None` means unclipped.
    clip: Option<Vec<u8>>,
}

impl GfxState {
    fn fresh() -> Self {
        Self {
            transform: Affine::IDENTITY,
            alpha: 1.0,
            op: CompositeOp::SourceOver,
            clip: None,
        }
    }
}

impl CpuCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize) * 4],
            state: GfxState::fresh(),
            saved: Vec::new(),
            pending_clip: None,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Coverage of `rect` under the current transform. A degenerate transform
    /// covers nothing.
    fn rasterize_rect(&self, rect: Rect) -> Vec<u8> {
        let mut coverage = vec![0u8; self.pixel_count()];
        let t = self.state.transform;
        if t.determinant().abs() < DEGENERATE_EPSILON {
            return coverage;
        }
        let inverse = t.inverse();
        let bbox = t.transform_rect_bbox(rect);
        let x0 = bbox.x0.floor().max(0.0) as u32;
        let y0 = bbox.y0.floor().max(0.0) as u32;
        let x1 = (bbox.x1.ceil().max(0.0) as u32).min(self.width);
        let y1 = (bbox.y1.ceil().max(0.0) as u32).min(self.height);

        for y in y0..y1 {
            for x in x0..x1 {
                let p = inverse * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if rect.contains(p) {
                    coverage[(y as usize) * (self.width as usize) + (x as usize)] = 255;
                }
            }
        }
        coverage
    }

    fn intersect_clip(&mut self, coverage: Vec<u8>) {
        match &mut self.state.clip {
            Some(clip) => {
                for (c, v) in clip.iter_mut().zip(coverage.iter()) {
                    *c = (*c).min(*v);
                }
            }
            None => self.state.clip = Some(coverage),
        }
    }

    fn clip_allows(&self, index: usize) -> bool {
        match &self.state.clip {
            Some(clip) => clip[index] > 0,
            None => true,
        }
    }

    fn composite_pixel(&mut self, index: usize, src: [u8; 4]) {
        let i = index * 4;
        let dst = [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ];
        let out = composite(dst, src, self.state.op);
        self.data[i..i + 4].copy_from_slice(&out);
    }
}

impl Canvas for CpuCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data = vec![0; (width as usize) * (height as usize) * 4];
        self.state = GfxState::fresh();
        self.saved.clear();
        self.pending_clip = None;
    }

    fn save(&mut self) {
        self.saved.push(self.state.clone());
    }

    fn restore(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
    }

    fn transform(&mut self, t: Affine) {
        self.state.transform *= t;
    }

    fn set_transform(&mut self, t: Affine) {
        self.state.transform = t;
    }

    fn global_alpha(&self) -> f64 {
        self.state.alpha
    }

    fn set_global_alpha(&mut self, alpha: f64) {
        self.state.alpha = alpha.clamp(0.0, 1.0);
    }

    fn set_composite_op(&mut self, op: CompositeOp) {
        self.state.op = op;
    }

    fn clip_rect(&mut self, rect: Rect) {
        let coverage = self.rasterize_rect(rect);
        self.intersect_clip(coverage);
    }

    fn clip_empty(&mut self) {
        self.state.clip = Some(vec![0; self.pixel_count()]);
    }

    fn add_clip_region(&mut self, rect: Rect) {
        let coverage = self.rasterize_rect(rect);
        match &mut self.pending_clip {
            Some(pending) => {
                for (p, v) in pending.iter_mut().zip(coverage.iter()) {
                    *p = (*p).max(*v);
                }
            }
            None => self.pending_clip = Some(coverage),
        }
    }

    fn apply_clip(&mut self) {
        if let Some(pending) = self.pending_clip.take() {
            self.intersect_clip(pending);
        }
    }

    fn clear(&mut self) {
        self.data.fill(0);
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) {
        let ([r, g, b], a) = paint.decompose().unwrap_or(([0.0, 0.0, 0.0], 1.0));
        let a = (a * self.state.alpha).clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        let src = premul_rgba8(r, g, b, a);

        let coverage = self.rasterize_rect(rect);
        for index in 0..self.pixel_count() {
            if coverage[index] > 0 && self.clip_allows(index) {
                self.composite_pixel(index, src);
            }
        }
    }

    fn stroke_rect(&mut self, rect: Rect, paint: &Paint) {
        let w = 1.0;
        let edges = [
            Rect::new(rect.x0, rect.y0, rect.x1, rect.y0 + w),
            Rect::new(rect.x0, rect.y1 - w, rect.x1, rect.y1),
            Rect::new(rect.x0, rect.y0 + w, rect.x0 + w, rect.y1 - w),
            Rect::new(rect.x1 - w, rect.y0 + w, rect.x1, rect.y1 - w),
        ];
        for edge in edges {
            if edge.width() > 0.0 && edge.height() > 0.0 {
                self.fill_rect(edge, paint);
            }
        }
    }

    fn snapshot(&self) -> Image {
        Image {
            width: self.width,
            height: self.height,
            data: self.data.clone(),
        }
    }

    fn draw_image(&mut self, image: &Image) {
        let t = self.state.transform;
        if t.determinant().abs() < DEGENERATE_EPSILON {
            return;
        }
        let alpha = self.state.alpha;
        let inverse = t.inverse();
        let src_w = image.width as usize;
        let src_h = image.height as usize;

        for y in 0..self.height {
            for x in 0..self.width {
                let index = (y as usize) * (self.width as usize) + (x as usize);
                if !self.clip_allows(index) {
                    continue;
                }
                let p = inverse * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if p.x < 0.0 || p.y < 0.0 {
                    continue;
                }
                let (sx, sy) = (p.x as usize, p.y as usize);
                if sx >= src_w || sy >= src_h {
                    continue;
                }
                let si = (sy * src_w + sx) * 4;
                let mut src = [
                    image.data[si],
                    image.data[si + 1],
                    image.data[si + 2],
                    image.data[si + 3],
                ];
                if alpha < 1.0 {
                    let scale = ((alpha * 255.0).round() as i32).clamp(0, 255) as u16;
                    for c in &mut src {
                        *c = mul_div255(u16::from(*c), scale);
                    }
                }
                if src[3] == 0 && self.state.op != CompositeOp::DestinationIn {
                    continue;
                }
                self.composite_pixel(index, src);
            }
        }
    }

    fn make_compatible(&self, width: u32, height: u32) -> Box<dyn Canvas> {
        Box::new(CpuCanvas::new(width, height))
    }
}

fn premul_rgba8(r: f64, g: f64, b: f64, a: f64) -> [u8; 4] {
    let quant = |v: f64| (v.clamp(0.0, 255.0) * a).round() as u8;
    [
        quant(r),
        quant(g),
        quant(b),
        (a * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

fn composite(dst: [u8; 4], src: [u8; 4], op: CompositeOp) -> [u8; 4] {
    match op {
        CompositeOp::SourceOver => over(dst, src),
        CompositeOp::DestinationIn => {
            let sa = u16::from(src[3]);
            [
                mul_div255(u16::from(dst[0]), sa),
                mul_div255(u16::from(dst[1]), sa),
                mul_div255(u16::from(dst[2]), sa),
                mul_div255(u16::from(dst[3]), sa),
            ]
        }
        op => blend(dst, src, op),
    }
}

fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    if src[3] == 0 {
        return dst;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

/// Separable blend modes, computed in straight-alpha float space per the
/// standard compositing equations, then re-premultiplied.
fn blend(dst: [u8; 4], src: [u8; 4], op: CompositeOp) -> [u8; 4] {
    let ab = f64::from(dst[3]) / 255.0;
    let a_s = f64::from(src[3]) / 255.0;
    if a_s <= 0.0 {
        return dst;
    }

    let unpremul = |p: [u8; 4], a: f64, i: usize| {
        if a <= 0.0 {
            0.0
        } else {
            (f64::from(p[i]) / 255.0 / a).min(1.0)
        }
    };

    let ao = a_s + ab * (1.0 - a_s);
    let mut out = [0u8; 4];
    for i in 0..3 {
        let cb = unpremul(dst, ab, i);
        let cs = unpremul(src, a_s, i);
        let blended = blend_channel(op, cb, cs);
        let co = a_s * (1.0 - ab) * cs + a_s * ab * blended + (1.0 - a_s) * ab * cb;
        out[i] = (co * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (ao * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

fn blend_channel(op: CompositeOp, cb: f64, cs: f64) -> f64 {
    match op {
        CompositeOp::Multiply => cb * cs,
        CompositeOp::Screen => cb + cs - cb * cs,
        CompositeOp::Lighten => cb.max(cs),
        CompositeOp::Darken => cb.min(cs),
        CompositeOp::Difference => (cb - cs).abs(),
        CompositeOp::Overlay => hard_light(cs, cb),
        CompositeOp::HardLight => hard_light(cb, cs),
        _ => cs,
    }
}

fn hard_light(cb: f64, cs: f64) -> f64 {
    if cs <= 0.5 {
        cb * (2.0 * cs)
    } else {
        let s = 2.0 * cs - 1.0;
        cb + s - cb * s
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> Paint {
        Paint::Packed(0xff0000)
    }

    #[test]
    fn fill_opaque_replaces_pixels() {
        let mut c = CpuCanvas::new(4, 4);
        c.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), &red());
        assert_eq!(c.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(c.pixel(3, 3), [255, 0, 0, 255]);
    }

    #[test]
    fn fill_respects_transform() {
        let mut c = CpuCanvas::new(4, 1);
        c.transform(Affine::translate((2.0, 0.0)));
        c.fill_rect(Rect::new(0.0, 0.0, 2.0, 1.0), &red());
        assert_eq!(c.pixel(1, 0), [0, 0, 0, 0]);
        assert_eq!(c.pixel(2, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn global_alpha_scales_fill() {
        let mut c = CpuCanvas::new(1, 1);
        c.set_global_alpha(0.5);
        c.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &red());
        let px = c.pixel(0, 0);
        assert_eq!(px[3], 128);
        assert_eq!(px[0], 128);
    }

    #[test]
    fn destination_in_keeps_pixels_under_opaque_source() {
        let mut c = CpuCanvas::new(2, 1);
        c.fill_rect(Rect::new(0.0, 0.0, 2.0, 1.0), &red());

        // Mask image: opaque over the left pixel only.
        let mask = Image {
            width: 2,
            height: 1,
            data: vec![0, 0, 255, 255, 0, 0, 0, 0],
        };
        c.set_composite_op(CompositeOp::DestinationIn);
        c.draw_image(&mask);

        assert_eq!(c.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(c.pixel(1, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn clip_restricts_fill_and_restore_recovers() {
        let mut c = CpuCanvas::new(4, 1);
        c.save();
        c.clip_rect(Rect::new(0.0, 0.0, 2.0, 1.0));
        c.fill_rect(Rect::new(0.0, 0.0, 4.0, 1.0), &red());
        assert_eq!(c.pixel(1, 0)[3], 255);
        assert_eq!(c.pixel(2, 0)[3], 0);

        c.restore();
        c.fill_rect(Rect::new(0.0, 0.0, 4.0, 1.0), &red());
        assert_eq!(c.pixel(3, 0)[3], 255);
    }

    #[test]
    fn pending_clip_survives_restore_until_applied() {
        let mut c = CpuCanvas::new(4, 1);
        c.save();
        c.add_clip_region(Rect::new(0.0, 0.0, 1.0, 1.0));
        c.restore();
        c.apply_clip();
        c.fill_rect(Rect::new(0.0, 0.0, 4.0, 1.0), &red());
        assert_eq!(c.pixel(0, 0)[3], 255);
        assert_eq!(c.pixel(1, 0)[3], 0);
    }

    #[test]
    fn clip_empty_draws_nothing() {
        let mut c = CpuCanvas::new(2, 1);
        c.clip_empty();
        c.fill_rect(Rect::new(0.0, 0.0, 2.0, 1.0), &red());
        assert_eq!(c.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn degenerate_transform_covers_nothing() {
        let mut c = CpuCanvas::new(2, 1);
        c.transform(Affine::scale_non_uniform(0.0, 1.0));
        c.fill_rect(Rect::new(0.0, 0.0, 2.0, 1.0), &red());
        assert_eq!(c.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn resize_resets_state_and_pixels() {
        let mut c = CpuCanvas::new(2, 1);
        c.set_global_alpha(0.25);
        c.clip_empty();
        c.fill_rect(Rect::new(0.0, 0.0, 2.0, 1.0), &red());
        c.resize(3, 1);
        assert_eq!(c.width(), 3);
        assert_eq!(c.global_alpha(), 1.0);
        c.fill_rect(Rect::new(0.0, 0.0, 3.0, 1.0), &red());
        assert_eq!(c.pixel(2, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn multiply_blend_darkens() {
        let mut c = CpuCanvas::new(1, 1);
        c.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &Paint::Packed(0x808080));
        c.set_composite_op(CompositeOp::Multiply);
        c.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &Paint::Packed(0x808080));
        let px = c.pixel(0, 0);
        assert!(px[0] < 0x80);
        assert_eq!(px[3], 255);
    }
}
