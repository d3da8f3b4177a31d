use crate::canvas::Canvas;

/// Recycles offscreen surfaces for mask compositing so that nested or
/// animated masks do not allocate a fresh surface every frame.
///
/// Surfaces are checked out by at most one consumer at a time and returned
/// with [`SurfacePool::release`]; releasing resets the surface's saved state
/// but keeps its backing store for reuse.
#[derive(Default)]
pub struct SurfacePool {
    free: Vec<Box<dyn Canvas>>,
}

impl SurfacePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a surface sized to match `reference`, creating one through
    /// [`Canvas::make_compatible`] only when the pool is empty.
    ///
    /// The returned surface is cleared, resized and `save()`d so a matching
    /// restore on release rewinds whatever state the consumer left behind.
    pub fn acquire(&mut self, reference: &dyn Canvas) -> Box<dyn Canvas> {
        let mut surface = self
            .free
            .pop()
            .unwrap_or_else(|| reference.make_compatible(reference.width(), reference.height()));
        surface.resize(reference.width(), reference.height());
        surface.save();
        surface
    }

    pub fn release(&mut self, mut surface: Box<dyn Canvas>) {
        surface.restore();
        self.free.push(surface);
    }

    pub fn idle_surfaces(&self) -> usize {
        self.free.len()
    }
}
