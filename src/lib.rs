//! Limelight is a retained-mode 2D compositor with a frame scheduler.
//!
//! The host owns a display tree ([`SceneGraph`]) of containers and leaves;
//! leaf content lives behind the [`NodeContent`] trait. Each frame, the
//! [`FrameScheduler`] decides whether a logical frame boundary was crossed,
//! broadcasts the frame-lifecycle phases to the script engine, and drives the
//! compositor ([`RenderVisitor`]) over an abstract output surface
//! ([`Canvas`]).
//!
//! # Pipeline overview
//!
//! 1. **Tick**: the host's frame callback lands in [`FrameScheduler::tick`];
//!    the logical clock catches up past `now` and the six frame phases fire.
//! 2. **Collect**: dirty-region collection gathers the stage-space bounds of
//!    nodes whose dirty flag is set (optional fast path).
//! 3. **Composite**: the render visitor walks the tree in painter order,
//!    maintaining transform, alpha, color-transform, blend, clip-depth and
//!    mask state on the canvas.
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Single-threaded**: all per-frame work is synchronous inside the host
//!   callback; the only asynchrony is the host scheduling the next one.
//! - **Premultiplied RGBA8** on the software surface ([`CpuCanvas`]).
#![forbid(unsafe_code)]

mod blend;
mod canvas;
mod canvas_cpu;
mod color;
mod dirty;
mod error;
mod pool;
mod scene;
mod scheduler;
mod visitor;

pub use blend::composite_op;
pub use canvas::{Canvas, CompositeOp, Image, Paint};
pub use canvas_cpu::CpuCanvas;
pub use color::{ColorAdjust, ColorClass, ColorTransform};
pub use dirty::{DirtyRegions, collect_dirty_regions};
pub use error::{LimelightError, LimelightResult};
pub use pool::SurfacePool;
pub use scene::{BlendMode, Cursor, NodeContent, NodeId, SceneGraph, SceneNode};
pub use scheduler::{
    FrameCancel, FramePhase, FrameScheduler, HitTester, HostClock, NullPhases, PhaseSink,
    RenderEvents, RendererOptions, StopSignal, Tick, render,
};
pub use visitor::RenderVisitor;
