//! Thread color resolution for SVG elements.

use palette::Srgb;
use regex::Regex;
use roxmltree::Node;
use std::sync::OnceLock;

/// Color used when nothing on the element or its ancestors resolves.
pub const DEFAULT_THREAD_COLOR: [u8; 3] = [0, 0, 0];

static STYLE_DECLARATION: OnceLock<Regex> = OnceLock::new();
static RGB_FUNCTION: OnceLock<Regex> = OnceLock::new();

fn style_declaration() -> &'static Regex {
    STYLE_DECLARATION.get_or_init(|| {
        Regex::new(r"(?i)(?:^|;)\s*(fill|stroke)\s*:\s*([^;]+)")
            .expect("style declaration pattern is a valid constant regex")
    })
}

fn rgb_function() -> &'static Regex {
    RGB_FUNCTION.get_or_init(|| {
        Regex::new(r"(?i)^rgb\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*\)$")
            .expect("rgb() pattern is a valid constant regex")
    })
}

/// Resolve the thread color of an element.
///
/// Order: the element's `fill`, its `stroke`, the first fill or stroke
/// declared in its `style`, then the nearest ancestor fill. Falls back to
/// [`DEFAULT_THREAD_COLOR`].
pub fn resolve_color(node: Node<'_, '_>) -> [u8; 3] {
    attribute_color(node, "fill")
        .or_else(|| attribute_color(node, "stroke"))
        .or_else(|| node.attribute("style").and_then(style_color))
        .or_else(|| inherited_fill(node))
        .unwrap_or(DEFAULT_THREAD_COLOR)
}

fn attribute_color(node: Node<'_, '_>, name: &str) -> Option<[u8; 3]> {
    node.attribute(name).and_then(parse_color)
}

/// First fill or stroke declaration in a `style` string, in the order
/// written, whose value is a color.
fn style_color(style: &str) -> Option<[u8; 3]> {
    style_declaration()
        .captures_iter(style)
        .find_map(|caps| parse_color(&caps[2]))
}

/// First fill declaration in a `style` string whose value is a color.
fn style_fill(style: &str) -> Option<[u8; 3]> {
    style_declaration()
        .captures_iter(style)
        .filter(|caps| caps[1].eq_ignore_ascii_case("fill"))
        .find_map(|caps| parse_color(&caps[2]))
}

fn inherited_fill(node: Node<'_, '_>) -> Option<[u8; 3]> {
    node.ancestors()
        .skip(1)
        .filter(|ancestor| ancestor.is_element())
        .find_map(|ancestor| {
            attribute_color(ancestor, "fill")
                .or_else(|| ancestor.attribute("style").and_then(style_fill))
        })
}

/// Parse a CSS color value. `none` and anything unrecognized give `None`.
pub fn parse_color(value: &str) -> Option<[u8; 3]> {
    let value = value.trim();
    let value = value
        .strip_suffix("!important")
        .map(str::trim_end)
        .unwrap_or(value);
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return None;
    }

    if let Some(hex) = value.strip_prefix('#') {
        return hex_to_rgb(hex);
    }

    if let Some(caps) = rgb_function().captures(value) {
        let channel = |i: usize| caps[i].parse::<u16>().ok().map(|v| v.min(255) as u8);
        return Some([channel(1)?, channel(2)?, channel(3)?]);
    }

    named_color(value)
}

/// Convert a hex color (with or without `#`) to RGB. Three-digit shorthand
/// expands each digit, so `abc` becomes `aabbcc`.
pub fn hex_to_rgb(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => hex.to_string(),
        _ => return None,
    };
    let r = u8::from_str_radix(&expanded[0..2], 16).ok()?;
    let g = u8::from_str_radix(&expanded[2..4], 16).ok()?;
    let b = u8::from_str_radix(&expanded[4..6], 16).ok()?;
    Some([r, g, b])
}

/// Convert RGB to hex string
pub fn rgb_to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2])
}

fn named_color(name: &str) -> Option<[u8; 3]> {
    let lower = name.to_ascii_lowercase();
    let color: Srgb<u8> = palette::named::from_str(&lower)?;
    Some([color.red, color.green, color.blue])
}
