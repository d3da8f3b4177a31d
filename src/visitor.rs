use kurbo::{Affine, Rect};

use crate::blend::composite_op;
use crate::canvas::{Canvas, CompositeOp, Paint};
use crate::color::ColorTransform;
use crate::dirty::DirtyRegions;
use crate::error::{LimelightError, LimelightResult};
use crate::pool::SurfacePool;
use crate::scene::{NodeId, SceneGraph, SceneNode};

const DEGENERATE_EPSILON: f64 = 1e-12;

const WIREFRAME_PAINT: &str = "#00c000";

/// Per-traversal state threaded by value through the visit. Passing copies
/// makes the save/restore discipline structural: a subtree can never leak a
/// modified color transform or clip flag to its siblings.
#[derive(Clone, Copy, Debug)]
struct RenderContext {
    color: ColorTransform,
    is_clipping: bool,
    /// Set when a dirty-region pre-pass restricts this traversal; clean
    /// leaves are then skipped. Mask-surface renders get a fresh context
    /// with this cleared, so mask geometry always draws in full; the
    /// masked layer itself keeps the outer flag.
    region_limited: bool,
}

impl RenderContext {
    fn new(region_limited: bool) -> Self {
        Self {
            color: ColorTransform::identity(),
            is_clipping: false,
            region_limited,
        }
    }
}

/// Active clip scopes plus the saved parent states, as one stack keyed by
/// traversal depth. Pushing a scope `save()`s the canvas; releasing it
/// `restore()`s, so clip geometry rewinds in strict LIFO order.
#[derive(Default)]
struct ClipStack {
    /// Triggering depths of open scopes, most recent first.
    scopes: Vec<i32>,
    saved: Vec<SavedScopes>,
}

struct SavedScopes {
    depth: u32,
    scopes: Vec<i32>,
}

impl ClipStack {
    /// On container entry: stash the parent's open scopes so the children
    /// start with a clean scope list.
    fn save_for_children(&mut self, depth: u32) {
        if !self.scopes.is_empty() {
            self.saved.push(SavedScopes {
                depth,
                scopes: std::mem::take(&mut self.scopes),
            });
        }
    }

    /// On container exit: close any scopes the children left open, then
    /// restore the parent's scope list if it was stashed at this depth.
    fn restore_after_children(&mut self, depth: u32, canvas: &mut dyn Canvas) {
        while self.scopes.pop().is_some() {
            canvas.restore();
        }
        if let Some(top) = self.saved.last()
            && top.depth == depth
        {
            self.scopes = self
                .saved
                .pop()
                .map(|s| s.scopes)
                .unwrap_or_default();
        }
    }

    /// Close scopes whose extent ended before `child_depth`.
    fn release_until(&mut self, child_depth: i32, canvas: &mut dyn Canvas) {
        while let Some(&front) = self.scopes.first() {
            if child_depth <= front {
                break;
            }
            self.scopes.remove(0);
            canvas.restore();
        }
    }

    fn push_scope(&mut self, clip_depth: i32, canvas: &mut dyn Canvas) {
        self.scopes.insert(0, clip_depth);
        canvas.save();
    }

    fn is_balanced(&self) -> bool {
        self.scopes.is_empty() && self.saved.is_empty()
    }
}

/// Walks the display tree in depth order and issues draw calls against the
/// output surface: per-node transform, alpha, blend, clip scopes and mask
/// compositing, with leaf drawing delegated to each node's own contract.
pub struct RenderVisitor<'a> {
    graph: &'a SceneGraph,
    pool: &'a mut SurfacePool,
    dirty: Option<&'a DirtyRegions>,
    refresh: bool,
    wireframe: bool,
    depth: u32,
    clips: ClipStack,
}

impl<'a> RenderVisitor<'a> {
    pub fn new(
        graph: &'a SceneGraph,
        pool: &'a mut SurfacePool,
        dirty: Option<&'a DirtyRegions>,
        refresh: bool,
    ) -> Self {
        Self {
            graph,
            pool,
            dirty,
            refresh,
            wireframe: false,
            depth: 0,
            clips: ClipStack::default(),
        }
    }

    /// Replace leaf drawing with stroked bounds (debug strategy).
    pub fn wireframe(mut self, enabled: bool) -> Self {
        self.wireframe = enabled;
        self
    }

    /// Render the full tree from the root into `canvas`.
    #[tracing::instrument(skip_all)]
    pub fn start(&mut self, canvas: &mut dyn Canvas) -> LimelightResult<()> {
        let cx = RenderContext::new(self.dirty.is_some());
        self.visit_children(canvas, self.graph.root(), cx)?;
        debug_assert!(self.clips.is_balanced(), "clip stack out of balance");
        Ok(())
    }

    /// Render only the root node's own content, pre-applying the inverse of
    /// its transform. Used when the destination surface already carries the
    /// root's transform.
    #[tracing::instrument(skip_all)]
    pub fn start_fragment(&mut self, canvas: &mut dyn Canvas) -> LimelightResult<()> {
        let graph = self.graph;
        let root = graph.root();
        let node = graph
            .node(root)
            .ok_or_else(|| LimelightError::render("fragment root is vacated"))?;

        let inverse = node
            .transform
            .filter(|t| t.determinant().abs() >= DEGENERATE_EPSILON)
            .map(|t| t.inverse());

        if let Some(inv) = inverse {
            canvas.save();
            canvas.transform(inv);
        }
        let result = self.visit(canvas, root, RenderContext::new(self.dirty.is_some()));
        if inverse.is_some() {
            canvas.restore();
        }
        result
    }

    fn visit_children(
        &mut self,
        canvas: &mut dyn Canvas,
        container: NodeId,
        cx: RenderContext,
    ) -> LimelightResult<()> {
        let graph = self.graph;
        let node = graph
            .node(container)
            .ok_or_else(|| LimelightError::render("container is vacated"))?;
        let children = node
            .children
            .as_ref()
            .ok_or_else(|| LimelightError::render("visit_children on a leaf node"))?;

        self.children_start(canvas);
        for slot in children {
            let Some(id) = slot else {
                continue;
            };
            let Some(child) = graph.node(*id) else {
                continue;
            };
            if child.visible && child.masked_by.is_none() {
                self.visit(canvas, *id, cx)?;
            }
        }
        self.children_end(canvas);
        Ok(())
    }

    fn children_start(&mut self, canvas: &mut dyn Canvas) {
        if self.depth == 0 {
            canvas.save();

            if let Some(dirty) = self.dirty
                && !self.refresh
                && !self.wireframe
            {
                dirty.clip(canvas);
            }

            if let Some(bg) = self.graph.background {
                if bg[3] < 255 {
                    canvas.clear();
                }
                if bg[3] > 0 {
                    let paint = Paint::rgba(bg[0], bg[1], bg[2], f64::from(bg[3]) / 255.0);
                    let full = Rect::new(
                        0.0,
                        0.0,
                        f64::from(canvas.width()),
                        f64::from(canvas.height()),
                    );
                    canvas.fill_rect(full, &paint);
                }
            }
        }
        self.depth += 1;
        self.clips.save_for_children(self.depth);
    }

    fn children_end(&mut self, canvas: &mut dyn Canvas) {
        self.clips.restore_after_children(self.depth, canvas);
        self.depth -= 1;
        if self.depth == 0 {
            canvas.restore();
            self.dirty = None;
        }
    }

    fn visit(
        &mut self,
        canvas: &mut dyn Canvas,
        id: NodeId,
        cx: RenderContext,
    ) -> LimelightResult<()> {
        let graph = self.graph;
        let node = graph
            .node(id)
            .ok_or_else(|| LimelightError::render("traversal reached a vacated node"))?;

        let mut cx = cx;
        let clipping_inherited = cx.is_clipping;
        if let Some(adjust) = &node.color_adjust {
            cx.color = cx.color.compose(adjust);
        }

        let mut clipping = clipping_inherited;
        if !clipping {
            self.clips.release_until(node.depth, canvas);
            if let Some(clip_depth) = node.clip_depth {
                clipping = true;
                cx.is_clipping = true;
                self.clips.push_scope(clip_depth, canvas);
            }
        }

        if clipping && node.is_container() {
            // A clip source never receives blending or masking of its own:
            // draw it and its children purely as clip geometry, then fold
            // the accumulated geometry into the active clip.
            canvas.save();
            self.draw_node(canvas, id, &cx)?;
            if let Some(children) = &node.children {
                for slot in children {
                    let Some(child_id) = slot else {
                        continue;
                    };
                    let Some(child) = graph.node(*child_id) else {
                        continue;
                    };
                    if child.visible && child.masked_by.is_none() {
                        self.visit(canvas, *child_id, cx)?;
                    }
                }
            }
            canvas.restore();
            if !clipping_inherited {
                canvas.apply_clip();
            }
            return Ok(());
        }

        canvas.save();
        canvas.set_composite_op(composite_op(node.blend));

        let result = if let Some(mask) = node.mask {
            self.composite_masked(canvas, id, mask, cx)
        } else {
            self.draw_node(canvas, id, &cx).and_then(|()| {
                if node.is_container() {
                    self.visit_children(canvas, id, cx)
                } else {
                    Ok(())
                }
            })
        };

        canvas.restore();

        if clipping && !clipping_inherited {
            canvas.apply_clip();
        }
        result
    }

    /// Two-surface mask compositing: the mask subtree and the masked node
    /// are each rendered under the node's *parent's* concatenated transform
    /// (masks are defined in the parent coordinate space), intersected with
    /// destination-in, and the result blitted at identity.
    fn composite_masked(
        &mut self,
        canvas: &mut dyn Canvas,
        id: NodeId,
        mask_id: NodeId,
        cx: RenderContext,
    ) -> LimelightResult<()> {
        let graph = self.graph;
        let node = graph
            .node(id)
            .ok_or_else(|| LimelightError::render("masked node is vacated"))?;
        let parent_transform = match node.parent {
            Some(parent) => graph.concatenated_transform(parent),
            None => Affine::IDENTITY,
        };

        let mut mask_surface = self.pool.acquire(canvas);
        let mut layer = self.pool.acquire(canvas);

        mask_surface.set_transform(parent_transform);
        let mut result = self.visit(mask_surface.as_mut(), mask_id, RenderContext::new(false));

        if result.is_ok() {
            layer.set_transform(parent_transform);
            result = self.draw_node(layer.as_mut(), id, &cx);
        }
        if result.is_ok() && node.is_container() {
            result = self.visit_children(layer.as_mut(), id, cx);
        }

        if result.is_ok() {
            layer.set_global_alpha(1.0);
            layer.set_composite_op(CompositeOp::DestinationIn);
            layer.set_transform(Affine::IDENTITY);
            layer.draw_image(&mask_surface.snapshot());

            // The blit inherits the composite op selected for the node's
            // blend mode and the ancestors' accumulated alpha.
            canvas.save();
            canvas.set_transform(Affine::IDENTITY);
            canvas.draw_image(&layer.snapshot());
            canvas.restore();
        }

        self.pool.release(layer);
        self.pool.release(mask_surface);
        result
    }

    fn draw_node(
        &mut self,
        canvas: &mut dyn Canvas,
        id: NodeId,
        cx: &RenderContext,
    ) -> LimelightResult<()> {
        let graph = self.graph;
        let node = graph
            .node(id)
            .ok_or_else(|| LimelightError::render("drawn node is vacated"))?;

        if let Some(t) = node.transform {
            if t.determinant().abs() < DEGENERATE_EPSILON {
                // Collapsed transform: the node renders as a zero-area
                // shape, so clip it (and its subtree) to nothing.
                canvas.clip_empty();
            } else {
                canvas.transform(t);
            }
        }

        if self.wireframe {
            return self.draw_wireframe(canvas, node);
        }

        if node.alpha != 1.0 {
            canvas.set_global_alpha(canvas.global_alpha() * node.alpha);
        }

        if cx.region_limited && !node.invalid.get() && !self.refresh {
            return Ok(());
        }

        if let Some(content) = &node.content {
            content.draw(canvas, cx.is_clipping, node.ratio, &cx.color)?;
        }
        node.invalid.set(false);
        Ok(())
    }

    fn draw_wireframe(&self, canvas: &mut dyn Canvas, node: &SceneNode) -> LimelightResult<()> {
        if !node.invalid.get() && !self.refresh {
            return Ok(());
        }
        if let Some(bounds) = node.content.as_ref().and_then(|c| c.bounds())
            && bounds.width() > 0.0
            && bounds.height() > 0.0
        {
            canvas.save();
            canvas.stroke_rect(bounds, &Paint::Css(WIREFRAME_PAINT.to_string()));
            canvas.restore();
        }
        node.invalid.set(false);
        Ok(())
    }
}
