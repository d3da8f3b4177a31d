use crate::canvas::CompositeOp;
use crate::scene::BlendMode;

/// Map a node's blend-mode tag onto the surface's composite operation.
///
/// Modes with no native raster equivalent (`Add`, `Subtract`, `Invert`,
/// `Shader`, and the Porter-Duff group `Alpha`/`Erase`/`Layer` which would
/// need a layer backdrop) silently fall back to `SourceOver`. This is a
/// documented fidelity limitation, not an error; it must stay quiet on the
/// per-frame path.
pub fn composite_op(mode: BlendMode) -> CompositeOp {
    match mode {
        BlendMode::Multiply => CompositeOp::Multiply,
        BlendMode::Screen => CompositeOp::Screen,
        BlendMode::Lighten => CompositeOp::Lighten,
        BlendMode::Darken => CompositeOp::Darken,
        BlendMode::Difference => CompositeOp::Difference,
        BlendMode::Overlay => CompositeOp::Overlay,
        BlendMode::HardLight => CompositeOp::HardLight,
        BlendMode::Normal
        | BlendMode::Add
        | BlendMode::Subtract
        | BlendMode::Invert
        | BlendMode::Alpha
        | BlendMode::Erase
        | BlendMode::Layer
        | BlendMode::Shader => CompositeOp::SourceOver,
    }
}
