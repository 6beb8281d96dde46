//! Generated stand-in graphics, produced as small SVG documents and
//! rasterized through the same path as caption text.

/// Art for a trailing caption-only slide.
pub fn text_only_svg(width: u32, height: u32) -> String {
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}"><rect width="100%" height="100%" fill="#ffffff"/><text x="50%" y="50%" font-family="sans-serif" font-size="14" text-anchor="middle" fill="#999999">Text only</text></svg>"##
    )
}

/// Art drawn into a cell whose image failed to decode.
pub fn load_error_svg(width: u32, height: u32) -> String {
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}"><rect width="100%" height="100%" fill="#555555"/><text x="50%" y="50%" font-family="sans-serif" font-size="14" text-anchor="middle" fill="#ffffff">Load error</text></svg>"##
    )
}
