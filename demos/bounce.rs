use std::time::{Duration, Instant};

use kurbo::{Affine, Rect};
use limelight::{
    Canvas, ColorTransform, CpuCanvas, FramePhase, FrameScheduler, LimelightResult, NodeContent,
    Paint, RenderEvents, RendererOptions, SceneGraph, SceneNode,
};

struct Square;

impl NodeContent for Square {
    fn draw(
        &self,
        canvas: &mut dyn Canvas,
        is_clipping: bool,
        _ratio: f64,
        color: &ColorTransform,
    ) -> LimelightResult<()> {
        let rect = Rect::new(0.0, 0.0, 16.0, 16.0);
        if is_clipping {
            canvas.add_clip_region(rect);
        } else {
            canvas.fill_rect(rect, &color.resolve_paint(&Paint::Packed(0xff8000)));
        }
        Ok(())
    }

    fn bounds(&self) -> Option<Rect> {
        Some(Rect::new(0.0, 0.0, 16.0, 16.0))
    }
}

struct WallClock {
    epoch: Instant,
}

impl limelight::HostClock for WallClock {
    fn now(&mut self) -> Duration {
        self.epoch.elapsed()
    }

    fn wait_for_frame(&mut self) {
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut graph = SceneGraph::new(30.0);
    graph.background = Some([16, 16, 32, 255]);
    let root = graph.root();
    let mut square = SceneNode::leaf(Box::new(Square));
    square.transform = Some(Affine::IDENTITY);
    let square_id = graph.add_child(root, square)?;

    let mut sched = FrameScheduler::new(
        RendererOptions::default(),
        RenderEvents::default(),
        Box::new(move |phase: FramePhase, graph: &mut SceneGraph| {
            if phase != FramePhase::AdvanceFrame {
                return;
            }
            if let Some(node) = graph.node_mut(square_id) {
                let t = node.transform.unwrap_or(Affine::IDENTITY);
                node.transform = Some(t * Affine::translate((2.0, 1.0)));
                node.invalid.set(true);
            }
        }),
    );

    let stop = sched.stop_signal();
    let frames = std::rc::Rc::new(std::cell::Cell::new(0u32));
    let counter = frames.clone();
    sched.events.on_after_frame = Some(Box::new(move || {
        counter.set(counter.get() + 1);
        if counter.get() >= 60 {
            stop.raise();
        }
    }));

    let mut canvas = CpuCanvas::new(320, 180);
    let mut clock = WallClock {
        epoch: Instant::now(),
    };
    sched.run(&mut graph, &mut canvas, &mut clock)?;

    let lit = canvas
        .snapshot()
        .data
        .chunks_exact(4)
        .filter(|px| px[3] > 0)
        .count();
    println!("rendered {} frames, {lit} lit pixels", frames.get());
    Ok(())
}
