//! Convert SVG line art into PES embroidery files.
//!
//! Every drawable element is sampled into evenly spaced needle points, scaled
//! to the requested physical size, and sewn as one color run.

mod color;
mod document;
mod error;
mod options;
mod pes;
mod preview;
mod sampler;
mod scaler;
mod sequence;
mod threads;

pub use color::{hex_to_rgb, parse_color, rgb_to_hex, DEFAULT_THREAD_COLOR};
pub use document::{parse_svg, DrawableElement, ShapeKind, SvgDocument};
pub use error::{ConversionError, GeometryError};
pub use options::{option_descriptors, ConversionOptions, EmptyDesignPolicy, OptionDescriptor};
pub use pes::{sanitize_label, write_pec, write_pes};
pub use preview::{encode_png, render_preview};
pub use sampler::{
    interval_count, sample_path, sample_path_within, sample_segment, DrawableSegment,
    MAX_STITCH_POINTS,
};
pub use scaler::{CoordinateScaler, TargetSize, ViewBox, UNITS_PER_MM};
pub use sequence::{
    build_sequence, Bounds, BuildOutcome, ColorRun, MoveKind, NeedleMove, SequenceBuilder,
    StitchCommand, StitchSequence,
};
pub use threads::{closest_pec_index, PecPalette, PecThread};

use serde::Serialize;
use std::time::Instant;

/// A converted design with its statistics
#[derive(Debug, Clone, Serialize)]
pub struct EmbroideryDesign {
    pub sequence: StitchSequence,
    pub stitch_count: usize,
    pub jump_count: usize,
    pub color_count: usize,
    /// Real extent of the stitches, which may be smaller than the target.
    pub width_mm: f64,
    pub height_mm: f64,
    pub skipped_elements: usize,
    pub placeholder: bool,
    pub processing_time_ms: u64,
}

impl EmbroideryDesign {
    /// Encode as a PES file labelled `name`.
    pub fn to_pes(&self, name: &str) -> Result<Vec<u8>, ConversionError> {
        write_pes(&self.sequence, name)
    }

    /// Render a PNG preview at `pixels_per_mm`.
    pub fn preview_png(&self, pixels_per_mm: f64) -> Result<Vec<u8>, ConversionError> {
        encode_png(render_preview(&self.sequence, pixels_per_mm)?)
    }
}

/// What a frontend needs to offer a conversion for a document
#[derive(Debug, Clone, Serialize)]
pub struct SvgAnalysis {
    pub options: Vec<OptionDescriptor>,
    pub view_box: ViewBox,
    pub view_box_declared: bool,
    pub drawable_elements: usize,
    pub malformed_elements: usize,
}

/// Inspect a document without converting it.
pub fn analyze_svg(svg: &str) -> Result<SvgAnalysis, ConversionError> {
    let document = parse_svg(svg)?;
    let analysis = SvgAnalysis {
        options: option_descriptors(),
        view_box: document.view_box,
        view_box_declared: document.view_box_declared,
        drawable_elements: document.elements.len(),
        malformed_elements: document.malformed_count(),
    };
    log::info!(
        "Analyzed SVG: {} drawable elements, {} malformed",
        analysis.drawable_elements,
        analysis.malformed_elements
    );
    Ok(analysis)
}

/// Convert SVG text into a stitch program.
///
/// # Arguments
/// * `svg` - The SVG document as text
/// * `options` - Target size, stitch density and empty-design policy
///
/// # Returns
/// EmbroideryDesign with the stitch sequence and its statistics. A document
/// with nothing to stitch fails with `ConversionError::EmptyDesign` unless
/// the placeholder policy is selected.
pub fn convert_svg(
    svg: &str,
    options: &ConversionOptions,
) -> Result<EmbroideryDesign, ConversionError> {
    options.validate()?;
    let timing_enabled = debug_timing_enabled();
    let t_total = Instant::now();

    log::info!(
        "Converting SVG: {} bytes, {}x{}mm, density {}mm",
        svg.len(),
        options.width_mm,
        options.height_mm,
        options.stitch_density
    );

    let t_parse = Instant::now();
    let document = parse_svg(svg)?;
    let parse_ms = t_parse.elapsed().as_millis();
    if !document.view_box_declared {
        log::warn!("SVG has no usable viewBox, assuming {:?}", document.view_box);
    }

    let t_build = Instant::now();
    let target = options.target_size();
    let scaler = CoordinateScaler::new(document.view_box, target);
    let outcome = build_sequence(
        &document.elements,
        &scaler,
        options.density_units(),
        options.empty_design,
        target,
    )?;
    let build_ms = t_build.elapsed().as_millis();

    let sequence = outcome.sequence;
    let bounds = sequence.bounds().unwrap_or_default();
    let processing_time_ms = t_total.elapsed().as_millis() as u64;
    let design = EmbroideryDesign {
        stitch_count: sequence.stitch_count(),
        jump_count: sequence.jump_count(),
        color_count: sequence.threads().len(),
        width_mm: bounds.width() / UNITS_PER_MM,
        height_mm: bounds.height() / UNITS_PER_MM,
        skipped_elements: outcome.skipped_elements,
        placeholder: outcome.placeholder,
        processing_time_ms,
        sequence,
    };

    if timing_enabled {
        log::debug!(
            "Conversion timing elements={} parse={}ms build={}ms total={}ms",
            document.elements.len(),
            parse_ms,
            build_ms,
            processing_time_ms
        );
    }
    log::info!(
        "Design converted: {:.1}x{:.1}mm, {} stitches, {} jumps, {} colors, {} skipped, {}ms",
        design.width_mm,
        design.height_mm,
        design.stitch_count,
        design.jump_count,
        design.color_count,
        design.skipped_elements,
        design.processing_time_ms
    );

    Ok(design)
}

/// Convert SVG text straight to PES bytes, labelled with the design name.
pub fn convert_svg_to_pes(
    svg: &str,
    options: &ConversionOptions,
) -> Result<Vec<u8>, ConversionError> {
    let design = convert_svg(svg, options)?;
    let bytes = design.to_pes(&options.design_name)?;
    log::info!("Encoded PES: {} bytes", bytes.len());
    Ok(bytes)
}

fn debug_timing_enabled() -> bool {
    matches!(
        std::env::var("SVGSTITCH_DEBUG_TIMING").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes") | Ok("YES")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE_SVG: &str =
        r##"<svg viewBox="0 0 100 100"><path d="M0 0 L50 0" stroke="#abc" fill="none"/></svg>"##;

    fn options(size_mm: f64) -> ConversionOptions {
        ConversionOptions {
            width_mm: size_mm,
            height_mm: size_mm,
            ..ConversionOptions::default()
        }
    }

    #[test]
    fn test_convert_worked_example() {
        let design = convert_svg(LINE_SVG, &options(50.0)).expect("conversion");
        assert_eq!(design.stitch_count, 10);
        assert_eq!(design.jump_count, 1);
        assert_eq!(design.color_count, 1);
        assert!((design.width_mm - 25.0).abs() < 1e-9);
        assert_eq!(design.height_mm, 0.0);
        assert!(!design.placeholder);
        assert_eq!(design.sequence.threads(), vec![[0xAA, 0xBB, 0xCC]]);
    }

    #[test]
    fn test_convert_mixed_document() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 200 100">
            <g fill="#ff0000">
                <rect x="10" y="10" width="50" height="30"/>
                <circle cx="150" cy="50" r="25" style="fill:#0000ff"/>
            </g>
            <path d="M 0 0 Q" stroke="black"/>
            <polyline points="0,90 50,95 100,90" stroke="green" fill="none"/>
        </svg>"##;
        let design = convert_svg(svg, &ConversionOptions::default()).expect("conversion");
        assert_eq!(design.color_count, 3);
        assert_eq!(design.skipped_elements, 1);
        assert_eq!(
            design.sequence.threads(),
            vec![[255, 0, 0], [0, 0, 255], [0, 128, 0]]
        );
        assert!(design.width_mm <= 100.0 + 1e-9);
    }

    #[test]
    fn test_empty_document_is_rejected() {
        let err = convert_svg(r#"<svg viewBox="0 0 10 10"></svg>"#, &ConversionOptions::default())
            .expect_err("nothing to stitch");
        assert_eq!(err, ConversionError::EmptyDesign);

        let placeholder = ConversionOptions {
            empty_design: EmptyDesignPolicy::Placeholder,
            ..ConversionOptions::default()
        };
        let design =
            convert_svg(r#"<svg viewBox="0 0 10 10"></svg>"#, &placeholder).expect("placeholder");
        assert!(design.placeholder);
        assert!((design.width_mm - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_input_errors() {
        assert!(matches!(
            convert_svg("not xml", &ConversionOptions::default()),
            Err(ConversionError::InvalidDocument(_))
        ));
        let bad = ConversionOptions {
            stitch_density: 0.0,
            ..ConversionOptions::default()
        };
        assert!(matches!(
            convert_svg(LINE_SVG, &bad),
            Err(ConversionError::InvalidOption {
                key: "stitch_density",
                ..
            })
        ));
    }

    #[test]
    fn test_convert_to_pes() {
        let options = ConversionOptions {
            design_name: "line".to_string(),
            ..options(50.0)
        };
        let bytes = convert_svg_to_pes(LINE_SVG, &options).expect("pes");
        assert_eq!(&bytes[..8], b"#PES0001");
        assert_eq!(&bytes[22..29], b"LA:line");
    }

    #[test]
    fn test_extreme_options_fail_without_panicking() {
        let tiny_density = ConversionOptions {
            stitch_density: 1e-300,
            ..ConversionOptions::default()
        };
        assert!(matches!(
            convert_svg(LINE_SVG, &tiny_density),
            Err(ConversionError::InvalidOption {
                key: "stitch_density",
                ..
            })
        ));

        let huge_line = ConversionOptions {
            stitch_density: 0.1,
            ..options(1e6)
        };
        assert!(matches!(
            convert_svg(LINE_SVG, &huge_line),
            Err(ConversionError::TooManyStitches { .. })
        ));

        let svg = r#"<svg viewBox="0 0 1 1">
            <path d="M0 0 L0.0000001 0"/>
            <path d="M1 1 L1.0000001 1"/>
        </svg>"#;
        let design = convert_svg(svg, &options(1e9)).expect("few stitches, far apart");
        assert!(matches!(
            design.to_pes("x"),
            Err(ConversionError::Encode(_))
        ));
    }

    #[test]
    fn test_analyze_reports_document_shape() {
        let svg = r#"<svg viewBox="0 0 300 150">
            <path d="M0 0 L10 10"/>
            <path d="bogus"/>
            <text>ignored</text>
        </svg>"#;
        let analysis = analyze_svg(svg).expect("analysis");
        assert_eq!(analysis.drawable_elements, 2);
        assert_eq!(analysis.malformed_elements, 1);
        assert!(analysis.view_box_declared);
        assert_eq!(analysis.view_box.width, 300.0);
        assert_eq!(analysis.options.len(), option_descriptors().len());

        let json = serde_json::to_value(&analysis).expect("serialize");
        assert_eq!(json["options"][0]["key"], "stitch_density");
        assert_eq!(json["options"][0]["default"], 2.5);
        assert_eq!(json["view_box"]["minX"], 0.0);
    }

    #[test]
    fn test_preview_png() {
        let design = convert_svg(LINE_SVG, &options(50.0)).expect("conversion");
        let png = design.preview_png(2.0).expect("preview");
        assert_eq!(&png[1..4], b"PNG");
    }
}
