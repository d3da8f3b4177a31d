use kurbo::{Affine, Rect};
use limelight::{
    Canvas, ColorTransform, CompositeOp, CpuCanvas, Image, LimelightResult, NodeContent, Paint,
    RenderVisitor, SceneGraph, SceneNode, SurfacePool,
};

/// Minimal leaf content: a solid rectangle that doubles as clip geometry
/// when drawn on the clipping path.
pub struct FillBox {
    rect: Rect,
    paint: Paint,
}

impl NodeContent for FillBox {
    fn draw(
        &self,
        canvas: &mut dyn Canvas,
        is_clipping: bool,
        _ratio: f64,
        color: &ColorTransform,
    ) -> LimelightResult<()> {
        if is_clipping {
            canvas.add_clip_region(self.rect);
        } else {
            canvas.fill_rect(self.rect, &color.resolve_paint(&self.paint));
        }
        Ok(())
    }

    fn bounds(&self) -> Option<Rect> {
        Some(self.rect)
    }
}

pub fn fill_leaf(rect: Rect, color: u32) -> SceneNode {
    SceneNode::leaf(Box::new(FillBox {
        rect,
        paint: Paint::Packed(color),
    }))
}

/// Full-surface redraw of `graph` into a fresh software canvas.
pub fn render_once(graph: &SceneGraph, width: u32, height: u32) -> CpuCanvas {
    let mut canvas = CpuCanvas::new(width, height);
    let mut pool = SurfacePool::new();
    RenderVisitor::new(graph, &mut pool, None, true)
        .start(&mut canvas)
        .unwrap();
    canvas
}

/// A [`Canvas`] that records its call sequence instead of rasterizing.
///
/// Used to assert traversal order and save/restore discipline without
/// inspecting pixels. Only the state the compositor reads back (global
/// alpha) is actually tracked.
pub struct RecordingCanvas {
    width: u32,
    height: u32,
    alpha: f64,
    alpha_stack: Vec<f64>,
    calls: Vec<String>,
}

impl RecordingCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alpha: 1.0,
            alpha_stack: Vec::new(),
            calls: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn count(&self, tag: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == tag).count()
    }

    /// The paint strings of the `fill` calls, in issue order.
    pub fn fills(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| c.strip_prefix("fill ").map(str::to_string))
            .collect()
    }

    fn log(&mut self, call: impl Into<String>) {
        self.calls.push(call.into());
    }
}

impl Canvas for RecordingCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.alpha = 1.0;
        self.alpha_stack.clear();
        self.log("resize");
    }

    fn save(&mut self) {
        self.alpha_stack.push(self.alpha);
        self.log("save");
    }

    fn restore(&mut self) {
        if let Some(alpha) = self.alpha_stack.pop() {
            self.alpha = alpha;
        }
        self.log("restore");
    }

    fn transform(&mut self, _t: Affine) {
        self.log("transform");
    }

    fn set_transform(&mut self, _t: Affine) {
        self.log("set_transform");
    }

    fn global_alpha(&self) -> f64 {
        self.alpha
    }

    fn set_global_alpha(&mut self, alpha: f64) {
        self.alpha = alpha;
        self.log("set_alpha");
    }

    fn set_composite_op(&mut self, op: CompositeOp) {
        self.log(format!("op {op:?}"));
    }

    fn clip_rect(&mut self, _rect: Rect) {
        self.log("clip_rect");
    }

    fn clip_empty(&mut self) {
        self.log("clip_empty");
    }

    fn add_clip_region(&mut self, _rect: Rect) {
        self.log("add_clip");
    }

    fn apply_clip(&mut self) {
        self.log("apply_clip");
    }

    fn clear(&mut self) {
        self.log("clear");
    }

    fn fill_rect(&mut self, _rect: Rect, paint: &Paint) {
        let paint = match paint {
            Paint::Packed(n) => format!("#{n:06x}"),
            Paint::Css(s) => s.clone(),
        };
        self.log(format!("fill {paint}"));
    }

    fn stroke_rect(&mut self, _rect: Rect, _paint: &Paint) {
        self.log("stroke");
    }

    fn snapshot(&self) -> Image {
        Image {
            width: self.width,
            height: self.height,
            data: vec![0; (self.width as usize) * (self.height as usize) * 4],
        }
    }

    fn draw_image(&mut self, _image: &Image) {
        self.log("draw_image");
    }

    fn make_compatible(&self, width: u32, height: u32) -> Box<dyn Canvas> {
        Box::new(RecordingCanvas::new(width, height))
    }
}
