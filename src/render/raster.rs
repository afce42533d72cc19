//! CPU raster backend on tiny-skia pixmaps

pub mod plot;
pub mod waterfall;

/// Reuse `pixmap` when it already has `width` x `height`, otherwise allocate
/// a new (cleared) one
pub(crate) fn ensure_pixmap(
    pixmap: &mut Option<tiny_skia::Pixmap>,
    width: u32,
    height: u32,
) -> Option<&mut tiny_skia::Pixmap> {
    let matches = pixmap
        .as_ref()
        .is_some_and(|p| p.width() == width && p.height() == height);
    if !matches {
        tracing::debug!(width, height, "Allocating raster target");
        *pixmap = tiny_skia::Pixmap::new(width, height);
    }
    pixmap.as_mut()
}

pub(crate) fn color([r, g, b, a]: [u8; 4]) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(r, g, b, a)
}
