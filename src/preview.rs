//! Raster previews of a stitch program.

use crate::error::ConversionError;
use crate::scaler::UNITS_PER_MM;
use crate::sequence::{MoveKind, StitchSequence};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;
use std::io::Cursor;

/// Blank border around the design, in pixels.
const MARGIN_PX: u32 = 8;

/// Largest preview edge, in pixels.
const MAX_PREVIEW_EDGE: u32 = 8192;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Draw every stitch as a line in its thread color. Jumps are not drawn.
pub fn render_preview(
    sequence: &StitchSequence,
    pixels_per_mm: f64,
) -> Result<RgbaImage, ConversionError> {
    if !(pixels_per_mm > 0.0) || !pixels_per_mm.is_finite() {
        return Err(ConversionError::InvalidOption {
            key: "pixels_per_mm",
            reason: format!("must be a positive number, got {}", pixels_per_mm),
        });
    }

    let bounds = sequence.bounds().unwrap_or_default();
    let scale = pixels_per_mm / UNITS_PER_MM;
    let edge = |extent: f64| -> Result<u32, ConversionError> {
        let px = (extent * scale).ceil() + 1.0 + 2.0 * MARGIN_PX as f64;
        if px > MAX_PREVIEW_EDGE as f64 {
            return Err(ConversionError::Encode(format!(
                "preview of {:.0}px exceeds the {}px limit",
                px, MAX_PREVIEW_EDGE
            )));
        }
        Ok(px as u32)
    };
    let width = edge(bounds.width())?;
    let height = edge(bounds.height())?;

    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);
    let to_pixel = |x: f64, y: f64| -> (f32, f32) {
        (
            ((x - bounds.min_x) * scale) as f32 + MARGIN_PX as f32,
            ((y - bounds.min_y) * scale) as f32 + MARGIN_PX as f32,
        )
    };

    for run in sequence.runs() {
        let color = Rgba([run.color[0], run.color[1], run.color[2], 255]);
        for pair in run.moves.windows(2) {
            if pair[1].kind != MoveKind::Stitch {
                continue;
            }
            let start = to_pixel(pair[0].position.x, pair[0].position.y);
            let end = to_pixel(pair[1].position.x, pair[1].position.y);
            draw_line_segment_mut(&mut canvas, start, end, color);
        }
    }

    log::debug!("Rendered {}x{} preview", width, height);
    Ok(canvas)
}

/// Encode an image as PNG bytes.
pub fn encode_png(image: RgbaImage) -> Result<Vec<u8>, ConversionError> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| ConversionError::Encode(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SequenceBuilder;
    use kurbo::Point;
    #[cfg(feature = "preview-fixtures")]
    use crate::{convert_svg, ConversionOptions};
    #[cfg(feature = "preview-fixtures")]
    use std::fs;
    #[cfg(feature = "preview-fixtures")]
    use std::path::Path;

    fn two_runs() -> StitchSequence {
        let mut builder = SequenceBuilder::new();
        builder.add_element(
            &[vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]],
            [255, 0, 0],
        );
        builder.add_element(
            &[vec![Point::new(0.0, 50.0), Point::new(100.0, 50.0)]],
            [0, 0, 255],
        );
        builder.finish().expect("sequence")
    }

    #[test]
    fn test_preview_dimensions_and_colors() {
        let image = render_preview(&two_runs(), 2.0).expect("preview");
        // 10mm x 5mm at 2px/mm
        assert_eq!(image.width(), 20 + 1 + 2 * MARGIN_PX);
        assert_eq!(image.height(), 10 + 1 + 2 * MARGIN_PX);

        assert_eq!(*image.get_pixel(MARGIN_PX + 5, MARGIN_PX), Rgba([255, 0, 0, 255]));
        assert_eq!(*image.get_pixel(MARGIN_PX + 5, MARGIN_PX + 10), Rgba([0, 0, 255, 255]));
        assert_eq!(*image.get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn test_jumps_are_not_drawn() {
        let image = render_preview(&two_runs(), 2.0).expect("preview");
        // the jump from (10mm, 0) to (0, 5mm) crosses the middle of the canvas
        assert_eq!(*image.get_pixel(MARGIN_PX + 10, MARGIN_PX + 5), BACKGROUND);
    }

    #[test]
    fn test_rejects_bad_scale() {
        assert!(matches!(
            render_preview(&two_runs(), 0.0),
            Err(ConversionError::InvalidOption { .. })
        ));
        assert!(matches!(
            render_preview(&two_runs(), 1.0e6),
            Err(ConversionError::Encode(_))
        ));
    }

    #[test]
    fn test_png_encoding() {
        let image = render_preview(&two_runs(), 1.0).expect("preview");
        let bytes = encode_png(image).expect("png");
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[cfg(feature = "preview-fixtures")]
    #[test]
    #[ignore = "Writes preview artifacts for the SVG fixtures under tests/fixtures"]
    fn preview_fixture_export_harness() {
        let fixture_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures");
        let mut files = fs::read_dir(&fixture_dir)
            .expect("fixture directory missing")
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|v| v.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("svg"))
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        files.sort();
        assert!(
            !files.is_empty(),
            "No fixture SVGs found in {}",
            fixture_dir.display()
        );

        let output_root = std::env::temp_dir().join("svgstitch-fixtures");
        fs::create_dir_all(&output_root).expect("failed to create output root");

        for fixture_path in files {
            let svg = fs::read_to_string(&fixture_path).expect("failed to read fixture svg");
            let stem = fixture_path
                .file_stem()
                .and_then(|v| v.to_str())
                .unwrap_or("fixture");
            let options = ConversionOptions {
                design_name: stem.to_string(),
                ..ConversionOptions::default()
            };
            let design = convert_svg(&svg, &options).expect("conversion failed");

            let pes = design.to_pes(stem).expect("failed to encode pes");
            fs::write(output_root.join(format!("{}.pes", stem)), pes)
                .expect("failed to write pes");
            let png = design.preview_png(4.0).expect("failed to render preview");
            fs::write(output_root.join(format!("{}.png", stem)), png)
                .expect("failed to write preview png");
            let json = serde_json::to_vec_pretty(design.sequence.commands())
                .expect("failed to serialize commands");
            fs::write(output_root.join(format!("{}.json", stem)), json)
                .expect("failed to write commands");
        }

        eprintln!("Fixture artifacts written to {}", output_root.display());
    }
}
