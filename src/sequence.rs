//! Stitch program assembly.
//!
//! A [`StitchSequence`] is the machine's motion program: jumps, stitches and
//! color breaks in the order the machine executes them, closed by one `End`.

use crate::color::DEFAULT_THREAD_COLOR;
use crate::document::DrawableElement;
use crate::error::ConversionError;
use crate::options::EmptyDesignPolicy;
use crate::sampler::{sample_path_within, subpaths, DrawableSegment, MAX_STITCH_POINTS};
use crate::scaler::{CoordinateScaler, TargetSize, UNITS_PER_MM};
use kurbo::{Line, Point};
use serde::{Deserialize, Serialize};

/// One machine command. Coordinates are in tenths of a millimeter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum StitchCommand {
    /// Needle-up move.
    Jump { x: f64, y: f64 },
    /// Needle-down move.
    Stitch { x: f64, y: f64 },
    /// Ends the current run; `color` is the thread the run was sewn with.
    ColorBreak { color: [u8; 3] },
    End,
}

impl StitchCommand {
    pub fn position(&self) -> Option<Point> {
        match *self {
            Self::Jump { x, y } | Self::Stitch { x, y } => Some(Point::new(x, y)),
            Self::ColorBreak { .. } | Self::End => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Jump,
    Stitch,
}

/// A positioned command inside a [`ColorRun`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeedleMove {
    pub kind: MoveKind,
    pub position: Point,
}

/// Moves sewn with one thread
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRun {
    pub color: [u8; 3],
    pub moves: Vec<NeedleMove>,
}

/// Axis-aligned extent of all positioned commands
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Ordered, immutable stitch program
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StitchSequence {
    commands: Vec<StitchCommand>,
}

impl StitchSequence {
    pub fn commands(&self) -> &[StitchCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn stitch_count(&self) -> usize {
        self.count(|c| matches!(c, StitchCommand::Stitch { .. }))
    }

    pub fn jump_count(&self) -> usize {
        self.count(|c| matches!(c, StitchCommand::Jump { .. }))
    }

    fn count(&self, predicate: impl Fn(&StitchCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    /// Thread colors in the order they are used, one per run.
    pub fn threads(&self) -> Vec<[u8; 3]> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                StitchCommand::ColorBreak { color } => Some(*color),
                _ => None,
            })
            .collect()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let mut points = self.commands.iter().filter_map(StitchCommand::position);
        let first = points.next()?;
        let init = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        Some(points.fold(init, |b, p| Bounds {
            min_x: b.min_x.min(p.x),
            min_y: b.min_y.min(p.y),
            max_x: b.max_x.max(p.x),
            max_y: b.max_y.max(p.y),
        }))
    }

    /// Group positioned commands by the color break that closes them. Moves
    /// after the last color break, if any, use the default thread.
    pub fn runs(&self) -> Vec<ColorRun> {
        let mut runs = Vec::new();
        let mut moves = Vec::new();
        for command in &self.commands {
            match *command {
                StitchCommand::Jump { x, y } => moves.push(NeedleMove {
                    kind: MoveKind::Jump,
                    position: Point::new(x, y),
                }),
                StitchCommand::Stitch { x, y } => moves.push(NeedleMove {
                    kind: MoveKind::Stitch,
                    position: Point::new(x, y),
                }),
                StitchCommand::ColorBreak { color } => runs.push(ColorRun {
                    color,
                    moves: std::mem::take(&mut moves),
                }),
                StitchCommand::End => break,
            }
        }
        if !moves.is_empty() {
            runs.push(ColorRun {
                color: DEFAULT_THREAD_COLOR,
                moves,
            });
        }
        runs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Idle,
    InPath,
    Done,
}

/// Appends commands element by element.
///
/// `Idle -> InPath` on an element's first point (Jump), `InPath -> InPath`
/// for every later point (Stitch, or Jump at the start of another subpath),
/// `InPath -> Idle` when the element ends (ColorBreak), `Done` after `End`.
#[derive(Debug)]
pub struct SequenceBuilder {
    commands: Vec<StitchCommand>,
    state: BuilderState,
}

impl Default for SequenceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceBuilder {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            state: BuilderState::Idle,
        }
    }

    /// Add one element given as sampled point runs, one per continuous path.
    /// Returns whether the element produced any command.
    pub fn add_element(&mut self, paths: &[Vec<Point>], color: [u8; 3]) -> bool {
        if self.state == BuilderState::Done {
            return false;
        }
        for points in paths {
            for (i, point) in points.iter().enumerate() {
                if i == 0 {
                    self.commands.push(StitchCommand::Jump {
                        x: point.x,
                        y: point.y,
                    });
                    self.state = BuilderState::InPath;
                } else {
                    self.commands.push(StitchCommand::Stitch {
                        x: point.x,
                        y: point.y,
                    });
                }
            }
        }
        if self.state == BuilderState::InPath {
            self.commands.push(StitchCommand::ColorBreak { color });
            self.state = BuilderState::Idle;
            true
        } else {
            false
        }
    }

    pub fn has_stitches(&self) -> bool {
        self.commands
            .iter()
            .any(|c| matches!(c, StitchCommand::Stitch { .. }))
    }

    pub fn finish(mut self) -> Result<StitchSequence, ConversionError> {
        if !self.has_stitches() {
            return Err(ConversionError::EmptyDesign);
        }
        self.commands.push(StitchCommand::End);
        self.state = BuilderState::Done;
        Ok(StitchSequence {
            commands: self.commands,
        })
    }
}

/// Result of building a document's stitch program
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub sequence: StitchSequence,
    /// Elements dropped because their geometry could not be read.
    pub skipped_elements: usize,
    pub placeholder: bool,
}

/// Sample every element and assemble the stitch program.
///
/// `density` is the stitch spacing in output units. Fails with
/// `TooManyStitches` once the whole program would exceed
/// [`MAX_STITCH_POINTS`] points.
pub fn build_sequence(
    elements: &[DrawableElement],
    scaler: &CoordinateScaler,
    density: f64,
    policy: EmptyDesignPolicy,
    target: TargetSize,
) -> Result<BuildOutcome, ConversionError> {
    let to_output = scaler.to_affine();
    let mut builder = SequenceBuilder::new();
    let mut budget = PointBudget::new(MAX_STITCH_POINTS);
    let mut skipped_elements = 0;

    for element in elements {
        let outline = match &element.outline {
            Ok(outline) => outline,
            Err(err) => {
                log::warn!("Skipping {}: {}", element.label(), err);
                skipped_elements += 1;
                continue;
            }
        };

        let mut mapped = outline.clone();
        mapped.apply_affine(to_output);
        let mut paths = Vec::new();
        for segments in subpaths(&mapped) {
            let points = budget.sample(&segments, density)?;
            if !points.is_empty() {
                paths.push(points);
            }
        }
        builder.add_element(&paths, element.color);
    }

    let mut placeholder = false;
    if !builder.has_stitches() && policy == EmptyDesignPolicy::Placeholder {
        log::warn!("No drawable geometry found, stitching placeholder cross");
        let cross = placeholder_cross(target, density, &mut budget)?;
        builder.add_element(&cross, DEFAULT_THREAD_COLOR);
        placeholder = true;
    }

    Ok(BuildOutcome {
        sequence: builder.finish()?,
        skipped_elements,
        placeholder,
    })
}

/// Both diagonals of the target area, sampled at `density`.
fn placeholder_cross(
    target: TargetSize,
    density: f64,
    budget: &mut PointBudget,
) -> Result<Vec<Vec<Point>>, ConversionError> {
    let w = target.width_mm * UNITS_PER_MM;
    let h = target.height_mm * UNITS_PER_MM;
    let mut paths = Vec::new();
    for line in [
        Line::new((0.0, 0.0), (w, h)),
        Line::new((w, 0.0), (0.0, h)),
    ] {
        let points = budget.sample(&[line], density)?;
        if !points.is_empty() {
            paths.push(points);
        }
    }
    Ok(paths)
}

/// Points still available to one conversion.
struct PointBudget {
    limit: usize,
    remaining: usize,
}

impl PointBudget {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    fn sample<S: DrawableSegment>(
        &mut self,
        segments: &[S],
        density: f64,
    ) -> Result<Vec<Point>, ConversionError> {
        let points = sample_path_within(segments, density, self.remaining)
            .ok_or(ConversionError::TooManyStitches { limit: self.limit })?;
        self.remaining -= points.len();
        Ok(points)
    }
}
