use kurbo::Rect;

use crate::canvas::{Canvas, Paint};
use crate::scene::{NodeId, SceneGraph};

/// The union of stage-space rectangles that changed since the last frame.
///
/// This is the optional pre-pass fast path: when present, the compositor
/// clips drawing to these regions and skips leaves whose dirty flag is
/// clear. When absent the frame falls back to a full-surface redraw.
#[derive(Clone, Debug, Default)]
pub struct DirtyRegions {
    rects: Vec<Rect>,
}

impl DirtyRegions {
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    fn push(&mut self, rect: Rect) {
        if rect.width() <= 0.0 || rect.height() <= 0.0 {
            return;
        }
        // Coalesce fully contained rects; overlapping ones are kept separate
        // and simply clip twice, which is harmless.
        for existing in &mut self.rects {
            if existing.union(rect) == *existing {
                return;
            }
            if existing.union(rect) == rect {
                *existing = rect;
                return;
            }
        }
        self.rects.push(rect);
    }

    /// Intersect the surface's active clip with the region set. An empty set
    /// means nothing changed, so it clips to nothing rather than not at all.
    pub fn clip(&self, canvas: &mut dyn Canvas) {
        if self.rects.is_empty() {
            canvas.clip_empty();
            return;
        }
        for rect in &self.rects {
            canvas.add_clip_region(*rect);
        }
        canvas.apply_clip();
    }

    /// Outline the regions, for the redraw-regions debug overlay.
    pub fn stroke(&self, canvas: &mut dyn Canvas, paint: &Paint) {
        for rect in &self.rects {
            canvas.stroke_rect(*rect, paint);
        }
    }
}

/// Walk the tree and gather the stage-space bounds of every node whose dirty
/// flag is set. Flags are left set; the compositor clears them as it draws.
///
/// With `collect` false (the pre-pass is disabled) this returns `None`,
/// forcing a full-surface redraw.
pub fn collect_dirty_regions(graph: &SceneGraph, collect: bool) -> Option<DirtyRegions> {
    if !collect {
        return None;
    }
    let mut regions = DirtyRegions::default();
    visit(graph, graph.root(), &mut regions);
    Some(regions)
}

fn visit(graph: &SceneGraph, id: NodeId, regions: &mut DirtyRegions) {
    let Some(node) = graph.node(id) else {
        return;
    };
    if node.invalid.get()
        && let Some(bounds) = node.content.as_ref().and_then(|c| c.bounds())
    {
        let stage = graph.concatenated_transform(id);
        regions.push(stage.transform_rect_bbox(bounds));
    }
    if let Some(children) = &node.children {
        for child in children.iter().flatten() {
            visit(graph, *child, regions);
        }
    }
}
