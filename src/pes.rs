//! PES writer.
//!
//! Emits the minimal PES version 1 container: the `#PES0001` signature and a
//! pointer to the PEC section, which carries the thread list, the encoded
//! stitch block and the monochrome thumbnails machines show on screen.

use crate::color::DEFAULT_THREAD_COLOR;
use crate::error::ConversionError;
use crate::options::DEFAULT_DESIGN_NAME;
use crate::sequence::{Bounds, MoveKind, NeedleMove, StitchCommand, StitchSequence};
use crate::threads::closest_pec_index;
use kurbo::Point;

const PES_SIGNATURE: &[u8] = b"#PES0001";

/// Byte offset of the PEC section in the truncated container.
const PEC_OFFSET: u32 = 0x16;

/// Characters available for the label in the PEC header.
const LABEL_LENGTH: usize = 16;

const PEC_HEADER_LENGTH: usize = 512;

/// Header bytes before the thread list: label line, padding, graphic info, padding.
const PEC_PREAMBLE_LENGTH: usize = 48;

const ICON_WIDTH: usize = 48;
const ICON_HEIGHT: usize = 38;
const ICON_STRIDE: usize = ICON_WIDTH / 8;
pub const ICON_BYTES: usize = ICON_STRIDE * ICON_HEIGHT;

/// Margin, in pixels, kept free around stitches drawn into an icon.
const ICON_BUFFER: f64 = 5.0;

/// Largest per-axis delta the long form can carry.
const MAX_LONG_DELTA: i32 = 2047;

const LONG_FORM: u16 = 0x8000;
const TRIM_FLAG: u16 = 0x2000;
const COLOR_CHANGE: [u8; 2] = [0xFE, 0xB0];
const END_MARK: u8 = 0xFF;

/// Largest absolute coordinate, in output units, the stitch block accepts.
const MAX_PEC_COORDINATE: f64 = i16::MAX as f64;

/// Most threads the one-byte count in the PEC header can describe.
const MAX_THREADS: usize = 256;

/// Largest stitch block length expressible in 24 bits.
const MAX_BLOCK_LENGTH: usize = 0xFF_FFFF;

/// Encode a stitch program as a PES file.
pub fn write_pes(sequence: &StitchSequence, name: &str) -> Result<Vec<u8>, ConversionError> {
    let pec = write_pec(sequence, name)?;

    let mut out = Vec::with_capacity(PEC_OFFSET as usize + pec.len());
    out.extend_from_slice(PES_SIGNATURE);
    out.extend_from_slice(&PEC_OFFSET.to_le_bytes());
    out.resize(PEC_OFFSET as usize, 0);
    out.extend_from_slice(&pec);
    Ok(out)
}

/// Encode the PEC section on its own.
pub fn write_pec(sequence: &StitchSequence, name: &str) -> Result<Vec<u8>, ConversionError> {
    let mut threads = sequence.threads();
    if threads.is_empty() {
        threads.push(DEFAULT_THREAD_COLOR);
    }
    if threads.len() > MAX_THREADS {
        return Err(ConversionError::Encode(format!(
            "{} thread changes exceed the PEC limit of {}",
            threads.len(),
            MAX_THREADS
        )));
    }
    check_extent(sequence.bounds().unwrap_or_default())?;

    let indices: Vec<u8> = threads.iter().map(|rgb| closest_pec_index(*rgb)).collect();
    log::debug!("PEC thread indices: {:?}", indices);

    let mut out = write_pec_header(&sanitize_label(name), &indices);
    out.extend_from_slice(&write_stitch_block(sequence)?);
    for icon in design_icons(sequence) {
        out.extend_from_slice(&icon);
    }
    Ok(out)
}

/// Keep printable ASCII only, cut to the label width.
pub fn sanitize_label(name: &str) -> String {
    let label: String = name
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .take(LABEL_LENGTH)
        .collect();
    let label = label.trim();
    if label.is_empty() {
        DEFAULT_DESIGN_NAME.to_string()
    } else {
        label.to_string()
    }
}

fn write_pec_header(label: &str, indices: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PEC_HEADER_LENGTH);
    out.extend_from_slice(format!("LA:{:<width$}\r", label, width = LABEL_LENGTH).as_bytes());
    out.extend_from_slice(&[0x20; 12]);
    out.extend_from_slice(&[0xFF, 0x00]);
    out.push((ICON_WIDTH / 8) as u8);
    out.push(ICON_HEIGHT as u8);
    out.extend_from_slice(&[0x20; 12]);
    debug_assert_eq!(out.len(), PEC_PREAMBLE_LENGTH);

    out.push((indices.len() - 1) as u8);
    out.extend_from_slice(indices);
    out.resize(PEC_HEADER_LENGTH, 0x20);
    out
}

/// Coordinates must fit the encoder's integer move arithmetic and the 16-bit
/// extent fields.
fn check_extent(bounds: Bounds) -> Result<(), ConversionError> {
    let corners = [bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y];
    if corners
        .iter()
        .all(|v| v.is_finite() && v.abs() <= MAX_PEC_COORDINATE)
    {
        Ok(())
    } else {
        Err(ConversionError::Encode(format!(
            "design extent {:.0}x{:.0} units exceeds the PEC coordinate range of +/-{}",
            bounds.width(),
            bounds.height(),
            MAX_PEC_COORDINATE
        )))
    }
}

fn write_stitch_block(sequence: &StitchSequence) -> Result<Vec<u8>, ConversionError> {
    let bounds = sequence.bounds().unwrap_or_default();
    let min_x = bounds.min_x.round() as i32;
    let min_y = bounds.min_y.round() as i32;
    let width = bounds.max_x.round() as i32 - min_x;
    let height = bounds.max_y.round() as i32 - min_y;

    let mut out = vec![0x00, 0x00];
    // length placeholder, patched once the moves are written
    out.extend_from_slice(&[0x00, 0x00, 0x00]);
    out.extend_from_slice(&[0x31, 0xFF, 0xF0]);
    out.extend_from_slice(&clamp_u16(width).to_le_bytes());
    out.extend_from_slice(&clamp_u16(height).to_le_bytes());
    out.extend_from_slice(&0x1E0u16.to_le_bytes());
    out.extend_from_slice(&0x1B0u16.to_le_bytes());
    out.extend_from_slice(&origin_field(min_x).to_be_bytes());
    out.extend_from_slice(&origin_field(min_y).to_be_bytes());
    out.extend_from_slice(&encode_stitches(sequence));

    if out.len() > MAX_BLOCK_LENGTH {
        return Err(ConversionError::Encode(format!(
            "stitch block of {} bytes does not fit the PEC length field",
            out.len()
        )));
    }
    let length = (out.len() as u32).to_le_bytes();
    out[2..5].copy_from_slice(&length[..3]);
    Ok(out)
}

fn clamp_u16(value: i32) -> u16 {
    value.clamp(0, u16::MAX as i32) as u16
}

fn origin_field(min: i32) -> u16 {
    ((-min) & 0x0FFF) as u16 | 0x9000
}

/// Moves are relative to the previous needle position, starting at the origin.
struct PecEncoder {
    out: Vec<u8>,
    x: i32,
    y: i32,
    jumping: bool,
    color_two: bool,
}

impl PecEncoder {
    fn new() -> Self {
        Self {
            out: Vec::new(),
            x: 0,
            y: 0,
            jumping: true,
            color_two: true,
        }
    }

    fn move_to(&mut self, kind: MoveKind, target: Point) {
        let tx = target.x.round() as i32;
        let ty = target.y.round() as i32;
        let (sx, sy) = (self.x, self.y);
        let (dx, dy) = (tx - sx, ty - sy);

        let span = dx.abs().max(dy.abs());
        let steps = ((span + MAX_LONG_DELTA - 1) / MAX_LONG_DELTA).max(1);
        for step in 1..=steps {
            let fraction = step as f64 / steps as f64;
            let nx = sx + (dx as f64 * fraction).round() as i32;
            let ny = sy + (dy as f64 * fraction).round() as i32;
            self.write_delta(kind, nx - self.x, ny - self.y);
            self.x = nx;
            self.y = ny;
        }
    }

    fn write_delta(&mut self, kind: MoveKind, dx: i32, dy: i32) {
        match kind {
            MoveKind::Jump => {
                self.jumping = true;
                self.write_long(long_form(dx) | TRIM_FLAG, long_form(dy) | TRIM_FLAG);
            }
            MoveKind::Stitch => {
                if self.jumping {
                    if dx != 0 && dy != 0 {
                        self.out.extend_from_slice(&[0x00, 0x00]);
                    }
                    self.jumping = false;
                }
                if is_short(dx) && is_short(dy) {
                    self.out.push((dx & 0x7F) as u8);
                    self.out.push((dy & 0x7F) as u8);
                } else {
                    self.write_long(long_form(dx), long_form(dy));
                }
            }
        }
    }

    fn write_long(&mut self, x: u16, y: u16) {
        self.out.extend_from_slice(&x.to_be_bytes());
        self.out.extend_from_slice(&y.to_be_bytes());
    }

    fn close_jump(&mut self) {
        if self.jumping {
            self.out.extend_from_slice(&[0x00, 0x00]);
            self.jumping = false;
        }
    }

    fn color_change(&mut self) {
        self.close_jump();
        self.out.extend_from_slice(&COLOR_CHANGE);
        self.out.push(if self.color_two { 0x02 } else { 0x01 });
        self.color_two = !self.color_two;
    }

    fn end(mut self) -> Vec<u8> {
        self.close_jump();
        self.out.push(END_MARK);
        self.out
    }
}

fn is_short(delta: i32) -> bool {
    -64 < delta && delta < 63
}

fn long_form(delta: i32) -> u16 {
    (delta & 0x0FFF) as u16 | LONG_FORM
}

/// Encode the move list. The color break closing the last run is implied by
/// the end mark and is not written.
pub(crate) fn encode_stitches(sequence: &StitchSequence) -> Vec<u8> {
    let commands = sequence.commands();
    let last_break = commands
        .iter()
        .rposition(|c| matches!(c, StitchCommand::ColorBreak { .. }));

    let mut encoder = PecEncoder::new();
    for (i, command) in commands.iter().enumerate() {
        match *command {
            StitchCommand::Jump { x, y } => encoder.move_to(MoveKind::Jump, Point::new(x, y)),
            StitchCommand::Stitch { x, y } => encoder.move_to(MoveKind::Stitch, Point::new(x, y)),
            StitchCommand::ColorBreak { .. } => {
                if Some(i) != last_break {
                    encoder.color_change();
                }
            }
            StitchCommand::End => break,
        }
    }
    encoder.end()
}

/// One icon for the whole design followed by one per thread.
fn design_icons(sequence: &StitchSequence) -> Vec<[u8; ICON_BYTES]> {
    let extent = sequence.bounds().unwrap_or_default();
    let runs = sequence.runs();
    let all: Vec<Point> = runs.iter().flat_map(|run| stitch_points(&run.moves)).collect();
    let mut icons = vec![render_icon(&extent, &all)];
    icons.extend(runs.iter().map(|run| render_icon(&extent, &stitch_points(&run.moves))));
    icons
}

fn stitch_points(moves: &[NeedleMove]) -> Vec<Point> {
    moves
        .iter()
        .filter(|m| m.kind == MoveKind::Stitch)
        .map(|m| m.position)
        .collect()
}

/// Draw stitch points, scaled to fit, inside the standard icon frame.
pub fn render_icon(extent: &Bounds, points: &[Point]) -> [u8; ICON_BYTES] {
    let mut icon = framed_icon();

    let width = if extent.width() > 0.0 { extent.width() } else { 1.0 };
    let height = if extent.height() > 0.0 { extent.height() } else { 1.0 };
    let scale = ((ICON_WIDTH as f64 - ICON_BUFFER) / width)
        .min((ICON_HEIGHT as f64 - ICON_BUFFER) / height);
    let center_x = (extent.min_x + extent.max_x) / 2.0;
    let center_y = (extent.min_y + extent.max_y) / 2.0;

    for point in points {
        let x = ((point.x - center_x) * scale + ICON_WIDTH as f64 / 2.0).floor();
        let y = ((point.y - center_y) * scale + ICON_HEIGHT as f64 / 2.0).floor();
        if x >= 0.0 && y >= 0.0 {
            set_icon_pixel(&mut icon, x as usize, y as usize);
        }
    }
    icon
}

fn framed_icon() -> [u8; ICON_BYTES] {
    let mut icon = [0u8; ICON_BYTES];
    let rows: [(usize, &[usize]); 6] = [
        (1, &[]),
        (2, &[3, 44]),
        (3, &[2, 45]),
        (34, &[2, 45]),
        (35, &[3, 44]),
        (36, &[]),
    ];
    for (y, pixels) in rows {
        if pixels.is_empty() {
            for x in 4..=43 {
                set_icon_pixel(&mut icon, x, y);
            }
        } else {
            for &x in pixels {
                set_icon_pixel(&mut icon, x, y);
            }
        }
    }
    for y in 4..=33 {
        set_icon_pixel(&mut icon, 1, y);
        set_icon_pixel(&mut icon, 46, y);
    }
    icon
}

fn set_icon_pixel(icon: &mut [u8; ICON_BYTES], x: usize, y: usize) {
    if x < ICON_WIDTH && y < ICON_HEIGHT {
        icon[y * ICON_STRIDE + x / 8] |= 1 << (x % 8);
    }
}
