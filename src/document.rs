//! Reading drawable geometry out of an SVG document.

use crate::color::resolve_color;
use crate::error::{ConversionError, GeometryError};
use crate::scaler::ViewBox;
use kurbo::{Affine, Arc, BezPath, Circle, Ellipse, Point, Shape, Vec2};
use roxmltree::{Document, Node};
use std::f64::consts::{FRAC_PI_2, PI};
use std::str::FromStr;

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Flattening tolerance for circles, ellipses and rounded corners, in user units.
const CURVE_TOLERANCE: f64 = 0.01;

/// CSS pixels per inch, for absolute length units.
const PX_PER_INCH: f64 = 96.0;

/// Containers whose children are never drawn directly.
const NON_RENDERED: &[&str] = &["defs", "clipPath", "mask", "symbol", "marker", "pattern"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Path,
    Rect,
    Circle,
    Ellipse,
    Line,
    Polyline,
    Polygon,
}

impl ShapeKind {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "path" => Self::Path,
            "rect" => Self::Rect,
            "circle" => Self::Circle,
            "ellipse" => Self::Ellipse,
            "line" => Self::Line,
            "polyline" => Self::Polyline,
            "polygon" => Self::Polygon,
            _ => return None,
        })
    }
}

/// One drawable element, with its outline already transformed into the
/// document's user space.
#[derive(Debug, Clone)]
pub struct DrawableElement {
    pub kind: ShapeKind,
    pub id: Option<String>,
    pub color: [u8; 3],
    pub outline: Result<BezPath, GeometryError>,
}

impl DrawableElement {
    /// Human-readable label for log messages.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => format!("{:?}#{}", self.kind, id),
            None => format!("{:?}", self.kind),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SvgDocument {
    pub view_box: ViewBox,
    /// `false` when the root had no usable `viewBox` and the default was used.
    pub view_box_declared: bool,
    pub elements: Vec<DrawableElement>,
}

impl SvgDocument {
    pub fn malformed_count(&self) -> usize {
        self.elements.iter().filter(|e| e.outline.is_err()).count()
    }
}

pub fn parse_svg(svg: &str) -> Result<SvgDocument, ConversionError> {
    let doc = Document::parse(svg).map_err(|e| ConversionError::InvalidDocument(e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "svg" {
        return Err(ConversionError::InvalidDocument(format!(
            "expected <svg> root element, found <{}>",
            root.tag_name().name()
        )));
    }

    let parsed_view_box = root.attribute("viewBox").and_then(ViewBox::parse);
    let view_box_declared = parsed_view_box.is_some();
    let view_box = parsed_view_box.unwrap_or_default();

    let elements = root
        .descendants()
        .filter(|node| node.is_element() && is_svg_element(*node))
        .filter_map(|node| ShapeKind::from_tag(node.tag_name().name()).map(|kind| (node, kind)))
        .filter(|(node, _)| is_rendered(*node))
        .map(|(node, kind)| DrawableElement {
            kind,
            id: node.attribute("id").map(str::to_string),
            color: resolve_color(node),
            outline: element_outline(node, kind).map(|mut path| {
                path.apply_affine(accumulated_transform(node));
                path
            }),
        })
        .collect();

    Ok(SvgDocument {
        view_box,
        view_box_declared,
        elements,
    })
}

fn is_svg_element(node: Node<'_, '_>) -> bool {
    matches!(node.tag_name().namespace(), None | Some(SVG_NAMESPACE))
}

fn is_rendered(node: Node<'_, '_>) -> bool {
    node.ancestors().filter(|n| n.is_element()).all(|n| {
        let hidden_container = n != node && NON_RENDERED.contains(&n.tag_name().name());
        !hidden_container && !is_display_none(n)
    })
}

fn is_display_none(node: Node<'_, '_>) -> bool {
    if node.attribute("display").map(str::trim) == Some("none") {
        return true;
    }
    node.attribute("style")
        .map(|style| {
            let compact: String = style.chars().filter(|c| !c.is_whitespace()).collect();
            compact.split(';').any(|decl| decl == "display:none")
        })
        .unwrap_or(false)
}

/// Transforms of the element and all of its ancestors, outermost applied last.
fn accumulated_transform(node: Node<'_, '_>) -> Affine {
    node.ancestors()
        .filter(|n| n.is_element())
        .fold(Affine::IDENTITY, |inner, n| {
            let own = n
                .attribute("transform")
                .map(parse_transform)
                .unwrap_or(Affine::IDENTITY);
            own * inner
        })
}

fn parse_transform(value: &str) -> Affine {
    match svgtypes::Transform::from_str(value) {
        Ok(ts) => Affine::new([ts.a, ts.b, ts.c, ts.d, ts.e, ts.f]),
        Err(err) => {
            log::warn!("Ignoring invalid transform {:?}: {}", value, err);
            Affine::IDENTITY
        }
    }
}

fn element_outline(node: Node<'_, '_>, kind: ShapeKind) -> Result<BezPath, GeometryError> {
    match kind {
        ShapeKind::Path => path_outline(node),
        ShapeKind::Rect => rect_outline(node),
        ShapeKind::Circle => {
            let center = Point::new(length_or(node, "cx", 0.0)?, length_or(node, "cy", 0.0)?);
            let r = required_length(node, "r")?;
            if r <= 0.0 {
                return Ok(BezPath::new());
            }
            Ok(Circle::new(center, r).to_path(CURVE_TOLERANCE))
        }
        ShapeKind::Ellipse => {
            let center = Point::new(length_or(node, "cx", 0.0)?, length_or(node, "cy", 0.0)?);
            let rx = required_length(node, "rx")?;
            let ry = required_length(node, "ry")?;
            if rx <= 0.0 || ry <= 0.0 {
                return Ok(BezPath::new());
            }
            Ok(Ellipse::new(center, (rx, ry), 0.0).to_path(CURVE_TOLERANCE))
        }
        ShapeKind::Line => {
            let mut path = BezPath::new();
            path.move_to((length_or(node, "x1", 0.0)?, length_or(node, "y1", 0.0)?));
            path.line_to((length_or(node, "x2", 0.0)?, length_or(node, "y2", 0.0)?));
            Ok(path)
        }
        ShapeKind::Polyline => poly_outline(node, false),
        ShapeKind::Polygon => poly_outline(node, true),
    }
}

fn path_outline(node: Node<'_, '_>) -> Result<BezPath, GeometryError> {
    let data = node
        .attribute("d")
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or(GeometryError::MissingAttribute("d"))?;
    BezPath::from_svg(data).map_err(|e| GeometryError::PathData(e.to_string()))
}

fn rect_outline(node: Node<'_, '_>) -> Result<BezPath, GeometryError> {
    let x = length_or(node, "x", 0.0)?;
    let y = length_or(node, "y", 0.0)?;
    let w = required_length(node, "width")?;
    let h = required_length(node, "height")?;
    if w <= 0.0 || h <= 0.0 {
        return Ok(BezPath::new());
    }

    let rx_attr = optional_length(node, "rx")?.filter(|v| *v > 0.0);
    let ry_attr = optional_length(node, "ry")?.filter(|v| *v > 0.0);
    let (rx, ry) = match (rx_attr, ry_attr) {
        (Some(rx), Some(ry)) => (rx, ry),
        (Some(r), None) | (None, Some(r)) => (r, r),
        (None, None) => (0.0, 0.0),
    };
    let rx = rx.min(w / 2.0);
    let ry = ry.min(h / 2.0);

    let (x0, y0, x1, y1) = (x, y, x + w, y + h);
    let mut path = BezPath::new();
    if rx <= 0.0 || ry <= 0.0 {
        path.move_to((x0, y0));
        path.line_to((x1, y0));
        path.line_to((x1, y1));
        path.line_to((x0, y1));
        path.close_path();
        return Ok(path);
    }

    let corner = |path: &mut BezPath, cx: f64, cy: f64, start: f64| {
        let arc = Arc {
            center: Point::new(cx, cy),
            radii: Vec2::new(rx, ry),
            start_angle: start,
            sweep_angle: FRAC_PI_2,
            x_rotation: 0.0,
        };
        path.extend(arc.append_iter(CURVE_TOLERANCE));
    };
    path.move_to((x0 + rx, y0));
    path.line_to((x1 - rx, y0));
    corner(&mut path, x1 - rx, y0 + ry, -FRAC_PI_2);
    path.line_to((x1, y1 - ry));
    corner(&mut path, x1 - rx, y1 - ry, 0.0);
    path.line_to((x0 + rx, y1));
    corner(&mut path, x0 + rx, y1 - ry, FRAC_PI_2);
    path.line_to((x0, y0 + ry));
    corner(&mut path, x0 + rx, y0 + ry, PI);
    path.close_path();
    Ok(path)
}

fn poly_outline(node: Node<'_, '_>, closed: bool) -> Result<BezPath, GeometryError> {
    let raw = node
        .attribute("points")
        .ok_or(GeometryError::MissingAttribute("points"))?;

    // Rendering stops at the first bad number; an odd trailing coordinate is dropped.
    let numbers: Vec<f64> = svgtypes::NumberListParser::from(raw)
        .map_while(Result::ok)
        .collect();
    let points: Vec<Point> = numbers
        .chunks_exact(2)
        .map(|pair| Point::new(pair[0], pair[1]))
        .collect();

    let mut path = BezPath::new();
    if points.len() < 2 {
        return Ok(path);
    }
    path.move_to(points[0]);
    for point in &points[1..] {
        path.line_to(*point);
    }
    if closed {
        path.close_path();
    }
    Ok(path)
}

fn required_length(node: Node<'_, '_>, name: &'static str) -> Result<f64, GeometryError> {
    optional_length(node, name)?.ok_or(GeometryError::MissingAttribute(name))
}

fn length_or(node: Node<'_, '_>, name: &'static str, default: f64) -> Result<f64, GeometryError> {
    Ok(optional_length(node, name)?.unwrap_or(default))
}

/// Read a length attribute in user units. Percentages and font-relative
/// units are not resolved and count as invalid.
fn optional_length(node: Node<'_, '_>, name: &'static str) -> Result<Option<f64>, GeometryError> {
    let Some(raw) = node.attribute(name) else {
        return Ok(None);
    };
    let invalid = || GeometryError::InvalidNumber {
        attribute: name,
        value: raw.to_string(),
    };
    let length = svgtypes::Length::from_str(raw.trim()).map_err(|_| invalid())?;
    let factor = match length.unit {
        svgtypes::LengthUnit::None | svgtypes::LengthUnit::Px => 1.0,
        svgtypes::LengthUnit::In => PX_PER_INCH,
        svgtypes::LengthUnit::Cm => PX_PER_INCH / 2.54,
        svgtypes::LengthUnit::Mm => PX_PER_INCH / 25.4,
        svgtypes::LengthUnit::Pt => PX_PER_INCH / 72.0,
        svgtypes::LengthUnit::Pc => PX_PER_INCH / 6.0,
        _ => return Err(invalid()),
    };
    let value = length.number * factor;
    if value.is_finite() {
        Ok(Some(value))
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::PathEl;

    fn only_element(svg: &str) -> DrawableElement {
        let doc = parse_svg(svg).expect("svg should parse");
        assert_eq!(doc.elements.len(), 1, "expected exactly one drawable");
        doc.elements.into_iter().next().expect("one element")
    }

    fn bbox(element: &DrawableElement) -> kurbo::Rect {
        element
            .outline
            .as_ref()
            .expect("outline should be valid")
            .bounding_box()
    }

    #[test]
    fn test_view_box_and_default() {
        let doc = parse_svg(r#"<svg viewBox="10 20 30 40"/>"#).expect("parse");
        assert!(doc.view_box_declared);
        assert_eq!(doc.view_box.min_x, 10.0);
        assert_eq!(doc.view_box.height, 40.0);

        let doc = parse_svg(r#"<svg width="5" height="5"/>"#).expect("parse");
        assert!(!doc.view_box_declared);
        assert_eq!(doc.view_box, ViewBox::default());
    }

    #[test]
    fn test_rejects_non_svg_documents() {
        assert!(matches!(
            parse_svg("<html/>"),
            Err(ConversionError::InvalidDocument(_))
        ));
        assert!(matches!(
            parse_svg("<svg><path></svg>"),
            Err(ConversionError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_namespaced_and_plain_elements_are_found() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
            <path d="M0 0 L10 10"/>
            <g><line x1="0" y1="0" x2="5" y2="0"/></g>
        </svg>"#;
        let doc = parse_svg(svg).expect("parse");
        assert_eq!(doc.elements.len(), 2);
        assert_eq!(doc.elements[0].kind, ShapeKind::Path);
        assert_eq!(doc.elements[1].kind, ShapeKind::Line);

        let other_ns = r#"<svg xmlns:x="urn:other"><x:path d="M0 0 L1 1"/></svg>"#;
        assert!(parse_svg(other_ns).expect("parse").elements.is_empty());
    }

    #[test]
    fn test_hidden_content_is_skipped() {
        let svg = r#"<svg>
            <defs><path d="M0 0 L1 1"/></defs>
            <clipPath><rect width="1" height="1"/></clipPath>
            <g display="none"><circle r="3"/></g>
            <path style="fill:red; display: none" d="M0 0 L1 1"/>
            <path id="shown" d="M0 0 L2 2"/>
        </svg>"#;
        let doc = parse_svg(svg).expect("parse");
        assert_eq!(doc.elements.len(), 1);
        assert_eq!(doc.elements[0].id.as_deref(), Some("shown"));
    }

    #[test]
    fn test_malformed_path_is_kept_as_error() {
        let svg = r#"<svg><path id="bad" d="M 0 0 X 5 5"/><path d=""/><path d="M0 0 L1 0"/></svg>"#;
        let doc = parse_svg(svg).expect("parse");
        assert_eq!(doc.elements.len(), 3);
        assert!(matches!(
            doc.elements[0].outline,
            Err(GeometryError::PathData(_))
        ));
        assert_eq!(
            doc.elements[1].outline,
            Err(GeometryError::MissingAttribute("d"))
        );
        assert!(doc.elements[2].outline.is_ok());
        assert_eq!(doc.malformed_count(), 2);
    }

    #[test]
    fn test_rect_outline() {
        let element = only_element(r#"<svg><rect x="5" y="10" width="20" height="8"/></svg>"#);
        let rect = bbox(&element);
        assert_eq!((rect.x0, rect.y0, rect.x1, rect.y1), (5.0, 10.0, 25.0, 18.0));
        let path = element.outline.expect("rect path");
        assert_eq!(path.elements().last(), Some(&PathEl::ClosePath));
    }

    #[test]
    fn test_rounded_rect_stays_inside_bounds() {
        let element =
            only_element(r#"<svg><rect width="20" height="10" rx="4" ry="30"/></svg>"#);
        let rect = bbox(&element);
        assert!(rect.x0 >= -1e-9 && rect.y0 >= -1e-9);
        assert!((rect.x1 - 20.0).abs() < 1e-6 && (rect.y1 - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_sized_shapes_have_empty_outline() {
        let element = only_element(r#"<svg><rect width="0" height="10"/></svg>"#);
        assert!(element.outline.expect("empty outline").is_empty());

        let element = only_element(r#"<svg><circle r="0"/></svg>"#);
        assert!(element.outline.expect("empty outline").is_empty());
    }

    #[test]
    fn test_circle_and_ellipse_bounds() {
        let circle = only_element(r#"<svg><circle cx="10" cy="10" r="5"/></svg>"#);
        let rect = bbox(&circle);
        assert!((rect.x0 - 5.0).abs() < 1e-6 && (rect.x1 - 15.0).abs() < 1e-6);

        let ellipse = only_element(r#"<svg><ellipse rx="4" ry="2"/></svg>"#);
        let rect = bbox(&ellipse);
        assert!((rect.width() - 8.0).abs() < 1e-6 && (rect.height() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_required_attribute() {
        let element = only_element(r#"<svg><circle cx="1"/></svg>"#);
        assert_eq!(element.outline.err(), Some(GeometryError::MissingAttribute("r")));

        let element = only_element(r#"<svg><rect width="10%" height="5"/></svg>"#);
        assert!(matches!(
            element.outline,
            Err(GeometryError::InvalidNumber {
                attribute: "width",
                ..
            })
        ));
    }

    #[test]
    fn test_polyline_and_polygon() {
        let polyline = only_element(r#"<svg><polyline points="0,0 10,0 10,10 7"/></svg>"#);
        let path = polyline.outline.expect("polyline path");
        assert_eq!(path.elements().len(), 3);

        let polygon = only_element(r#"<svg><polygon points="0 0 10 0 10 10"/></svg>"#);
        let path = polygon.outline.expect("polygon path");
        assert_eq!(path.elements().last(), Some(&PathEl::ClosePath));
    }

    #[test]
    fn test_transforms_are_composed() {
        let svg = r#"<svg>
            <g transform="translate(100 0)">
                <line transform="scale(2)" x1="1" y1="1" x2="2" y2="1"/>
            </g>
        </svg>"#;
        let element = only_element(svg);
        let rect = bbox(&element);
        assert_eq!((rect.x0, rect.y0, rect.x1), (102.0, 2.0, 104.0));
    }

    #[test]
    fn test_length_units() {
        let element = only_element(r#"<svg><line x2="1in" y2="25.4mm"/></svg>"#);
        let rect = bbox(&element);
        assert!((rect.x1 - 96.0).abs() < 1e-9);
        assert!((rect.y1 - 96.0).abs() < 1e-9);
    }
}
