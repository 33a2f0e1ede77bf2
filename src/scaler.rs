use kurbo::{Affine, Point};
use serde::{Deserialize, Serialize};

/// Output units per millimeter. PES coordinates are tenths of a millimeter.
pub const UNITS_PER_MM: f64 = 10.0;

/// Scale used on an axis whose viewBox extent is not positive.
const FALLBACK_SCALE: f64 = 1.0;

/// Source coordinate space of the drawing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewBox {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for ViewBox {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            width: 100.0,
            height: 100.0,
        }
    }
}

impl ViewBox {
    /// Parse a `viewBox` attribute value. Anything other than four numbers
    /// yields `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut numbers = Vec::with_capacity(4);
        for number in svgtypes::NumberListParser::from(value) {
            numbers.push(number.ok()?);
        }
        match numbers.as_slice() {
            [min_x, min_y, width, height] => Some(Self {
                min_x: *min_x,
                min_y: *min_y,
                width: *width,
                height: *height,
            }),
            _ => None,
        }
    }
}

/// Physical size of the finished embroidery
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TargetSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

/// Maps viewBox coordinates onto output units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateScaler {
    origin_x: f64,
    origin_y: f64,
    scale_x: f64,
    scale_y: f64,
}

impl CoordinateScaler {
    pub fn new(view_box: ViewBox, target: TargetSize) -> Self {
        Self {
            origin_x: view_box.min_x,
            origin_y: view_box.min_y,
            scale_x: axis_scale(target.width_mm, view_box.width),
            scale_y: axis_scale(target.height_mm, view_box.height),
        }
    }

    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    pub fn apply(&self, point: Point) -> Point {
        Point::new(
            (point.x - self.origin_x) * self.scale_x,
            (point.y - self.origin_y) * self.scale_y,
        )
    }

    pub fn invert(&self, point: Point) -> Point {
        Point::new(
            point.x / self.scale_x + self.origin_x,
            point.y / self.scale_y + self.origin_y,
        )
    }

    /// The same mapping as an affine transform, for mapping whole segments.
    pub fn to_affine(&self) -> Affine {
        Affine::new([
            self.scale_x,
            0.0,
            0.0,
            self.scale_y,
            -self.origin_x * self.scale_x,
            -self.origin_y * self.scale_y,
        ])
    }
}

fn axis_scale(target_mm: f64, extent: f64) -> f64 {
    if extent > 0.0 && extent.is_finite() {
        target_mm * UNITS_PER_MM / extent
    } else {
        FALLBACK_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size_mm: f64) -> TargetSize {
        TargetSize {
            width_mm: size_mm,
            height_mm: size_mm,
        }
    }

    #[test]
    fn test_scale_factors() {
        let scaler = CoordinateScaler::new(ViewBox::default(), square(50.0));
        assert_eq!(scaler.scale_x(), 5.0);
        assert_eq!(scaler.scale_y(), 5.0);
        assert_eq!(scaler.apply(Point::new(10.0, 20.0)), Point::new(50.0, 100.0));
    }

    #[test]
    fn test_offset_view_box() {
        let view_box = ViewBox {
            min_x: -10.0,
            min_y: 5.0,
            width: 20.0,
            height: 40.0,
        };
        let scaler = CoordinateScaler::new(view_box, TargetSize {
            width_mm: 20.0,
            height_mm: 20.0,
        });
        assert_eq!(scaler.apply(Point::new(-10.0, 5.0)), Point::ZERO);
        assert_eq!(scaler.apply(Point::new(10.0, 45.0)), Point::new(200.0, 200.0));
    }

    #[test]
    fn test_invert_round_trips() {
        let view_box = ViewBox {
            min_x: 3.5,
            min_y: -7.25,
            width: 123.0,
            height: 45.0,
        };
        let scaler = CoordinateScaler::new(view_box, TargetSize {
            width_mm: 87.0,
            height_mm: 61.0,
        });
        for point in [
            Point::new(0.0, 0.0),
            Point::new(3.5, -7.25),
            Point::new(99.125, 12.0),
            Point::new(-40.0, 300.0),
        ] {
            let back = scaler.invert(scaler.apply(point));
            assert!((back.x - point.x).abs() < 1e-9);
            assert!((back.y - point.y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_affine_matches_apply() {
        let view_box = ViewBox {
            min_x: 10.0,
            min_y: 20.0,
            width: 50.0,
            height: 25.0,
        };
        let scaler = CoordinateScaler::new(view_box, square(100.0));
        let point = Point::new(35.0, 32.5);
        let via_affine = scaler.to_affine() * point;
        let direct = scaler.apply(point);
        assert!((via_affine.x - direct.x).abs() < 1e-9);
        assert!((via_affine.y - direct.y).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_view_box_uses_fallback_scale() {
        let view_box = ViewBox {
            min_x: 0.0,
            min_y: 0.0,
            width: 0.0,
            height: -5.0,
        };
        let scaler = CoordinateScaler::new(view_box, square(50.0));
        assert_eq!(scaler.scale_x(), FALLBACK_SCALE);
        assert_eq!(scaler.scale_y(), FALLBACK_SCALE);
        assert_eq!(scaler.apply(Point::new(4.0, 6.0)), Point::new(4.0, 6.0));
    }

    #[test]
    fn test_parse_view_box() {
        assert_eq!(
            ViewBox::parse("0 0 100 50"),
            Some(ViewBox {
                min_x: 0.0,
                min_y: 0.0,
                width: 100.0,
                height: 50.0,
            })
        );
        assert_eq!(
            ViewBox::parse("-5,-5, 10,10").map(|vb| vb.min_x),
            Some(-5.0)
        );
        assert_eq!(ViewBox::parse("0 0 100"), None);
        assert_eq!(ViewBox::parse("a b c d"), None);
        assert_eq!(ViewBox::parse("0 0 0 0").map(|vb| vb.width), Some(0.0));
    }
}
