use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::canvas::{Canvas, Paint};
use crate::dirty::collect_dirty_regions;
use crate::error::{LimelightError, LimelightResult};
use crate::pool::SurfacePool;
use crate::scene::SceneGraph;
use crate::visitor::RenderVisitor;

const REDRAW_REGION_PAINT: &str = "#ff0000";

/// The frame-lifecycle notifications broadcast to the script engine, in the
/// order the scheduler fires them. The first three mutate the tree and are
/// skipped on the very first frame (the initial tree is assumed already
/// constructed); the next three always run. `Render` fires only when a
/// deferred render event was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    AdvanceFrame,
    EnterFrame,
    ConstructChildren,
    FrameConstructed,
    ExecuteFrame,
    ExitFrame,
    Render,
}

/// Seam to the script engine that mutates the tree between frames.
pub trait PhaseSink {
    fn broadcast(&mut self, phase: FramePhase, graph: &mut SceneGraph);
}

impl<F: FnMut(FramePhase, &mut SceneGraph)> PhaseSink for F {
    fn broadcast(&mut self, phase: FramePhase, graph: &mut SceneGraph) {
        self(phase, graph)
    }
}

/// Sink for hosts that drive rendering without a script engine.
pub struct NullPhases;

impl PhaseSink for NullPhases {
    fn broadcast(&mut self, _phase: FramePhase, _graph: &mut SceneGraph) {}
}

/// Hit-testing hook: run after drawing when the pointer moved since the last
/// callback. Implementations update the graph's cursor hint.
pub trait HitTester {
    fn handle_mouse(&mut self, graph: &mut SceneGraph);
}

/// Passed to `on_before_frame`; setting `cancel` demotes the callback to a
/// non-rendering one (no phase advance, no draw, no deadline movement).
#[derive(Debug, Default)]
pub struct FrameCancel {
    pub cancel: bool,
}

/// Host-facing lifecycle callbacks.
#[derive(Default)]
pub struct RenderEvents {
    pub on_before_frame: Option<Box<dyn FnMut(&mut FrameCancel)>>,
    pub on_after_frame: Option<Box<dyn FnMut()>>,
    pub on_terminated: Option<Box<dyn FnMut()>>,
}

/// Diagnostic and fidelity toggles, all off by default. Passed in at
/// construction; never global.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RendererOptions {
    /// Skip the dirty-region pre-pass; every frame redraws the full surface.
    pub disable_dirty_regions: bool,
    /// Run frame logic but never invoke the compositor.
    pub disable_compositor: bool,
    /// Ignore pointer movement entirely.
    pub disable_hit_testing: bool,
    /// Stroke the dirty regions after drawing.
    pub show_redraw_regions: bool,
    /// Draw stroked bounds instead of content.
    pub wireframe: bool,
    /// Drop frames instead of catching up: the logical deadline advances
    /// exactly once per rendered callback regardless of backlog.
    pub turbo: bool,
}

/// Cooperative stop flag, shareable with host callbacks. Checked once per
/// tick, after all phase callbacks have run to completion.
#[derive(Clone, Default)]
pub struct StopSignal(Rc<Cell<bool>>);

impl StopSignal {
    pub fn raise(&self) {
        self.0.set(true);
    }

    pub fn is_raised(&self) -> bool {
        self.0.get()
    }
}

/// Outcome of one host callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Re-arm the host callback; the next logical frame boundary is at
    /// `next_render_at`.
    Rearm { next_render_at: Duration },
    /// The stop signal was honored; do not re-arm.
    Terminated,
}

/// The host's frame-callback mechanism: a monotonic clock plus a way to
/// sleep until the next callback. `now` is relative to an arbitrary epoch.
pub trait HostClock {
    fn now(&mut self) -> Duration;
    fn wait_for_frame(&mut self);
    fn surface_visible(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Owns the logical frame clock and drives the compositor.
///
/// Each host callback lands in [`FrameScheduler::tick`], which decides
/// whether a logical frame boundary was crossed, runs the six-phase
/// frame-advance sequence, draws, and reports whether to re-arm. All work is
/// synchronous within the callback; the only asynchrony is the host
/// scheduling the next one.
pub struct FrameScheduler {
    options: RendererOptions,
    /// Host lifecycle callbacks; may be swapped between ticks.
    pub events: RenderEvents,
    phases: Box<dyn PhaseSink>,
    hit_tester: Option<Box<dyn HitTester>>,
    pool: SurfacePool,
    stop: StopSignal,
    next_render_at: Duration,
    first_run: bool,
    frame_count: u64,
    state: SchedulerState,
}

impl FrameScheduler {
    pub fn new(options: RendererOptions, events: RenderEvents, phases: Box<dyn PhaseSink>) -> Self {
        Self {
            options,
            events,
            phases,
            hit_tester: None,
            pool: SurfacePool::new(),
            stop: StopSignal::default(),
            next_render_at: Duration::ZERO,
            first_run: true,
            frame_count: 0,
            state: SchedulerState::Idle,
        }
    }

    pub fn with_hit_tester(mut self, hit_tester: Box<dyn HitTester>) -> Self {
        self.hit_tester = Some(hit_tester);
        self
    }

    /// Defer the first frame boundary to `at` instead of the clock epoch.
    pub fn with_first_deadline(mut self, at: Duration) -> Self {
        self.next_render_at = at;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn request_stop(&mut self) {
        self.stop.raise();
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn next_render_at(&self) -> Duration {
        self.next_render_at
    }

    /// Handle one host callback at time `now`.
    ///
    /// `surface_visible` is the host's report of whether the output surface
    /// can currently be seen; when false the drawing sub-step is skipped but
    /// frame logic still runs, so animation state never stalls.
    pub fn tick(
        &mut self,
        graph: &mut SceneGraph,
        canvas: &mut dyn Canvas,
        now: Duration,
        surface_visible: bool,
    ) -> LimelightResult<Tick> {
        match self.state {
            SchedulerState::Stopped => return Ok(Tick::Terminated),
            SchedulerState::Running => {
                return Err(LimelightError::scheduler("tick re-entered while running"));
            }
            SchedulerState::Idle => {}
        }
        self.state = SchedulerState::Running;
        let outcome = self.tick_inner(graph, canvas, now, surface_visible);
        self.state = match outcome {
            Ok(Tick::Terminated) => SchedulerState::Stopped,
            _ => SchedulerState::Idle,
        };
        outcome
    }

    fn tick_inner(
        &mut self,
        graph: &mut SceneGraph,
        canvas: &mut dyn Canvas,
        now: Duration,
        surface_visible: bool,
    ) -> LimelightResult<Tick> {
        let mut render_frame = now >= self.next_render_at;
        if render_frame && let Some(before) = &mut self.events.on_before_frame {
            let mut event = FrameCancel::default();
            before(&mut event);
            render_frame = !event.cancel;
        }

        let refresh = graph.take_stage_invalid();
        let mouse_moved = graph.take_mouse_moved();

        if render_frame || refresh || mouse_moved {
            if render_frame {
                self.advance_clock(graph, now)?;
                self.broadcast_frame_phases(graph);
                self.frame_count += 1;
            }

            if graph.take_deferred_render_event() {
                self.phases.broadcast(FramePhase::Render, graph);
            }

            if surface_visible && (refresh || render_frame) {
                self.draw(graph, canvas, refresh)?;
            }

            if mouse_moved
                && !self.options.disable_hit_testing
                && let Some(hit_tester) = &mut self.hit_tester
            {
                hit_tester.handle_mouse(graph);
            }

            if render_frame && let Some(after) = &mut self.events.on_after_frame {
                after();
            }
        } else {
            tracing::trace!(now_ms = now.as_millis() as u64, "skip frame");
        }

        if self.stop.is_raised() {
            tracing::debug!(frames = self.frame_count, "rendering terminated");
            if let Some(terminated) = &mut self.events.on_terminated {
                terminated();
            }
            return Ok(Tick::Terminated);
        }
        Ok(Tick::Rearm {
            next_render_at: self.next_render_at,
        })
    }

    /// Advance the logical deadline. Normal mode catches up past `now` so a
    /// slow host never drifts the phase of subsequent frames; turbo advances
    /// exactly once, dropping the backlog.
    fn advance_clock(&mut self, graph: &SceneGraph, now: Duration) -> LimelightResult<()> {
        let rate = graph.frame_rate();
        if !(rate > 0.0 && rate.is_finite()) {
            return Err(LimelightError::scheduler(format!(
                "frame rate must be finite and > 0, got {rate}"
            )));
        }
        let interval = Duration::from_secs_f64(1.0 / rate);

        self.next_render_at += interval;
        if !self.options.turbo {
            let mut skipped = 0u32;
            while self.next_render_at <= now {
                self.next_render_at += interval;
                skipped += 1;
            }
            if skipped > 0 {
                tracing::trace!(skipped, "catch-up: host callback lagged the logical clock");
            }
        }
        Ok(())
    }

    fn broadcast_frame_phases(&mut self, graph: &mut SceneGraph) {
        if self.first_run {
            // The initial tree is already constructed.
            self.first_run = false;
        } else {
            self.phases.broadcast(FramePhase::AdvanceFrame, graph);
            self.phases.broadcast(FramePhase::EnterFrame, graph);
            self.phases.broadcast(FramePhase::ConstructChildren, graph);
        }
        self.phases.broadcast(FramePhase::FrameConstructed, graph);
        self.phases.broadcast(FramePhase::ExecuteFrame, graph);
        self.phases.broadcast(FramePhase::ExitFrame, graph);
    }

    fn draw(
        &mut self,
        graph: &SceneGraph,
        canvas: &mut dyn Canvas,
        refresh: bool,
    ) -> LimelightResult<()> {
        let dirty = collect_dirty_regions(graph, !self.options.disable_dirty_regions);

        if !self.options.disable_compositor {
            RenderVisitor::new(graph, &mut self.pool, dirty.as_ref(), refresh)
                .wireframe(self.options.wireframe)
                .start(canvas)?;
        }

        if self.options.show_redraw_regions
            && !refresh
            && let Some(dirty) = &dirty
        {
            dirty.stroke(canvas, &Paint::Css(REDRAW_REGION_PAINT.to_string()));
        }
        Ok(())
    }

    /// Drive the scheduler with a host clock until the stop signal is
    /// honored.
    #[tracing::instrument(skip_all)]
    pub fn run(
        &mut self,
        graph: &mut SceneGraph,
        canvas: &mut dyn Canvas,
        clock: &mut dyn HostClock,
    ) -> LimelightResult<()> {
        loop {
            let now = clock.now();
            let visible = clock.surface_visible();
            match self.tick(graph, canvas, now, visible)? {
                Tick::Terminated => return Ok(()),
                Tick::Rearm { .. } => clock.wait_for_frame(),
            }
        }
    }
}

/// One-call entry point: construct a scheduler and run it to termination.
pub fn render(
    graph: &mut SceneGraph,
    canvas: &mut dyn Canvas,
    events: RenderEvents,
    options: RendererOptions,
    phases: Box<dyn PhaseSink>,
    clock: &mut dyn HostClock,
) -> LimelightResult<()> {
    FrameScheduler::new(options, events, phases).run(graph, canvas, clock)
}
