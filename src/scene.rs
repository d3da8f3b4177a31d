use std::cell::Cell;

use kurbo::{Affine, Rect};

use crate::canvas::Canvas;
use crate::color::{ColorAdjust, ColorTransform};
use crate::error::{LimelightError, LimelightResult};

/// Handle into a [`SceneGraph`]'s node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Blend mode tag as declared on a node. Only a subset has a native
/// composite-operation equivalent; see [`crate::composite_op`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Lighten,
    Darken,
    Difference,
    Overlay,
    HardLight,
    Add,
    Subtract,
    Invert,
    Alpha,
    Erase,
    Layer,
    Shader,
}

/// Cursor hint produced by the hit-testing pass and surfaced to the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Cursor {
    #[default]
    Auto,
    Pointer,
}

/// Leaf draw contract. The node's own content (vector shapes, text, cached
/// bitmaps) lives behind this trait and is out of the compositor's scope.
pub trait NodeContent {
    /// Draw into `canvas` under its current transform/alpha/clip state.
    ///
    /// When `is_clipping` is set the content is being used as clip geometry:
    /// it must accumulate regions via [`Canvas::add_clip_region`] instead of
    /// painting.
    fn draw(
        &self,
        canvas: &mut dyn Canvas,
        is_clipping: bool,
        ratio: f64,
        color: &ColorTransform,
    ) -> LimelightResult<()>;

    /// Local-space bounds, used by dirty-region collection and wireframe
    /// rendering. `None` opts out of both.
    fn bounds(&self) -> Option<Rect> {
        None
    }
}

/// A node in the externally-owned display tree, exposed to the compositor
/// through a narrow read contract. The `invalid` dirty flag is the one field
/// the compositor writes (it clears it after drawing), hence the `Cell`.
pub struct SceneNode {
    pub transform: Option<Affine>,
    pub alpha: f64,
    pub color_adjust: Option<ColorAdjust>,
    pub blend: BlendMode,
    /// Another node whose opaque pixels restrict this node's visibility.
    pub mask: Option<NodeId>,
    /// Set on a node that is currently acting as some other node's mask
    /// source; such nodes are skipped by direct traversal.
    pub masked_by: Option<NodeId>,
    /// Declaring a clip depth turns this node into a clip source for all
    /// following siblings up to that depth.
    pub clip_depth: Option<i32>,
    /// Sibling z-order; also the depth clip scopes are keyed by.
    pub depth: i32,
    pub visible: bool,
    pub invalid: Cell<bool>,
    /// Frame ratio forwarded verbatim to the draw contract.
    pub ratio: f64,
    /// `Some` marks a container; slots may be `None` for removed children.
    pub children: Option<Vec<Option<NodeId>>>,
    pub content: Option<Box<dyn NodeContent>>,
    pub(crate) parent: Option<NodeId>,
}

impl SceneNode {
    pub fn leaf(content: Box<dyn NodeContent>) -> Self {
        Self {
            content: Some(content),
            ..Self::bare()
        }
    }

    pub fn container() -> Self {
        Self {
            children: Some(Vec::new()),
            ..Self::bare()
        }
    }

    fn bare() -> Self {
        Self {
            transform: None,
            alpha: 1.0,
            color_adjust: None,
            blend: BlendMode::Normal,
            mask: None,
            masked_by: None,
            clip_depth: None,
            depth: 0,
            visible: true,
            invalid: Cell::new(true),
            ratio: 0.0,
            children: None,
            content: None,
            parent: None,
        }
    }

    pub fn is_container(&self) -> bool {
        self.children.is_some()
    }
}

/// The retained display tree plus the stage-level host flags the scheduler
/// reads. Nodes are arena-allocated; `NodeId`s stay valid across removals
/// (slots are tombstoned, never reused within a graph's lifetime).
pub struct SceneGraph {
    nodes: Vec<Option<SceneNode>>,
    root: NodeId,
    frame_rate: f64,
    pub background: Option<[u8; 4]>,
    stage_invalid: Cell<bool>,
    mouse_moved: Cell<bool>,
    mouse_over: Cell<bool>,
    defer_render_event: Cell<bool>,
    cursor: Cell<Cursor>,
}

impl SceneGraph {
    pub fn new(frame_rate: f64) -> Self {
        let root = SceneNode::container();
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
            frame_rate,
            background: None,
            // A fresh stage has never been painted, so the first frame is a
            // full redraw.
            stage_invalid: Cell::new(true),
            mouse_moved: Cell::new(false),
            mouse_over: Cell::new(false),
            defer_render_event: Cell::new(false),
            cursor: Cell::new(Cursor::Auto),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn set_frame_rate(&mut self, frame_rate: f64) {
        self.frame_rate = frame_rate;
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Append `node` as the last child slot of `parent`.
    pub fn add_child(&mut self, parent: NodeId, node: SceneNode) -> LimelightResult<NodeId> {
        let id = NodeId(self.nodes.len() as u32);
        let mut node = node;
        node.parent = Some(parent);
        self.nodes.push(Some(node));

        let parent_node = self
            .node_mut(parent)
            .ok_or_else(|| LimelightError::validation("add_child: no such parent node"))?;
        let children = parent_node
            .children
            .as_mut()
            .ok_or_else(|| LimelightError::validation("add_child: parent is not a container"))?;
        children.push(Some(id));
        Ok(id)
    }

    /// Tombstone a child slot in place. The slot stays, preserving the
    /// numeric indices of the remaining siblings.
    pub fn remove_child(&mut self, parent: NodeId, slot: usize) -> LimelightResult<()> {
        let parent_node = self
            .node_mut(parent)
            .ok_or_else(|| LimelightError::validation("remove_child: no such parent node"))?;
        let children = parent_node
            .children
            .as_mut()
            .ok_or_else(|| LimelightError::validation("remove_child: parent is not a container"))?;
        let entry = children
            .get_mut(slot)
            .ok_or_else(|| LimelightError::validation("remove_child: slot out of range"))?;
        if let Some(id) = entry.take() {
            self.nodes[id.0 as usize] = None;
        }
        Ok(())
    }

    /// Declare `mask` as the mask source for `node`. The mask node is flagged
    /// so direct traversal skips it; it is only ever drawn through the mask
    /// compositing path.
    pub fn set_mask(&mut self, node: NodeId, mask: Option<NodeId>) -> LimelightResult<()> {
        let previous = self
            .node(node)
            .ok_or_else(|| LimelightError::validation("set_mask: no such node"))?
            .mask;
        if let Some(old) = previous
            && let Some(old_node) = self.node_mut(old)
        {
            old_node.masked_by = None;
        }
        if let Some(new) = mask {
            let mask_node = self
                .node_mut(new)
                .ok_or_else(|| LimelightError::validation("set_mask: no such mask node"))?;
            mask_node.masked_by = Some(node);
        }
        if let Some(n) = self.node_mut(node) {
            n.mask = mask;
        }
        Ok(())
    }

    /// Product of the transforms from the root down to `id` inclusive.
    pub fn concatenated_transform(&self, id: NodeId) -> Affine {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.node(current) else {
                break;
            };
            if let Some(t) = node.transform {
                chain.push(t);
            }
            cursor = node.parent;
        }
        let mut out = Affine::IDENTITY;
        for t in chain.into_iter().rev() {
            out *= t;
        }
        out
    }

    // Stage-level flags. These mirror the host's view of the output surface
    // and are read-and-cleared once per scheduler tick.

    pub fn invalidate_stage(&self) {
        self.stage_invalid.set(true);
    }

    pub(crate) fn take_stage_invalid(&self) -> bool {
        self.stage_invalid.replace(false)
    }

    pub fn notify_mouse_moved(&self, over_stage: bool) {
        self.mouse_moved.set(true);
        self.mouse_over.set(over_stage);
    }

    pub(crate) fn take_mouse_moved(&self) -> bool {
        let moved = self.mouse_moved.replace(false);
        moved && self.mouse_over.get()
    }

    pub fn defer_render_event(&self) {
        self.defer_render_event.set(true);
    }

    pub(crate) fn take_deferred_render_event(&self) -> bool {
        self.defer_render_event.replace(false)
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor.get()
    }

    pub fn set_cursor(&self, cursor: Cursor) {
        self.cursor.set(cursor);
    }
}
