//! Brother PEC thread table and nearest-thread lookup.
//!
//! PEC files store thread colors as indices into a fixed 64-entry table.
//! Design colors are matched to the table with CIEDE2000 in Lab space.

use crate::color::{hex_to_rgb, rgb_to_hex};
use palette::{color_difference::Ciede2000, white_point::D65, FromColor, Lab, Srgb};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::OnceLock;

/// PEC thread entry with precomputed LAB values
#[derive(Debug, Clone, Serialize)]
pub struct PecThread {
    /// 1-based index written to the PEC header.
    pub index: u8,
    pub name: &'static str,
    pub hex: String,
    pub rgb: [u8; 3],
    pub lab: [f32; 3],
}

// (index, name, hex)
const PEC_THREADS: &[(u8, &str, &str)] = &[
    (1, "Prussian Blue", "#0E1F7C"),
    (2, "Blue", "#0A55A3"),
    (3, "Teal Green", "#008777"),
    (4, "Cornflower Blue", "#4B6BAF"),
    (5, "Red", "#ED171F"),
    (6, "Reddish Brown", "#D15C00"),
    (7, "Magenta", "#913697"),
    (8, "Light Lilac", "#E49ACB"),
    (9, "Lilac", "#915FAC"),
    (10, "Mint Green", "#9ED67D"),
    (11, "Deep Gold", "#E8A900"),
    (12, "Orange", "#FEBA35"),
    (13, "Yellow", "#FFFF00"),
    (14, "Lime Green", "#70BC1F"),
    (15, "Brass", "#BA9800"),
    (16, "Silver", "#A8A8A8"),
    (17, "Russet Brown", "#7D6F00"),
    (18, "Cream Brown", "#FFFFB3"),
    (19, "Pewter", "#4F5556"),
    (20, "Black", "#000000"),
    (21, "Ultramarine", "#0B3D91"),
    (22, "Royal Purple", "#770176"),
    (23, "Dark Gray", "#293133"),
    (24, "Dark Brown", "#2A1301"),
    (25, "Deep Rose", "#F64A8A"),
    (26, "Light Brown", "#B27624"),
    (27, "Salmon Pink", "#FCBBC5"),
    (28, "Vermilion", "#FE370F"),
    (29, "White", "#F0F0F0"),
    (30, "Violet", "#6A1C8A"),
    (31, "Seacrest", "#A8DDC4"),
    (32, "Sky Blue", "#2584BB"),
    (33, "Pumpkin", "#FEB343"),
    (34, "Cream Yellow", "#FFF36B"),
    (35, "Khaki", "#D0A660"),
    (36, "Clay Brown", "#D15400"),
    (37, "Leaf Green", "#66BA49"),
    (38, "Peacock Blue", "#134A46"),
    (39, "Gray", "#878787"),
    (40, "Warm Gray", "#D8CCC6"),
    (41, "Dark Olive", "#435607"),
    (42, "Flesh Pink", "#FDD9DE"),
    (43, "Pink", "#F993BC"),
    (44, "Deep Green", "#003822"),
    (45, "Lavender", "#B2AFD4"),
    (46, "Wisteria Violet", "#686AB0"),
    (47, "Beige", "#EFE3B9"),
    (48, "Carmine", "#F73866"),
    (49, "Amber Red", "#B54B64"),
    (50, "Olive Green", "#132B1A"),
    (51, "Dark Fuchsia", "#C70156"),
    (52, "Tangerine", "#FE9E32"),
    (53, "Light Blue", "#A8DEEB"),
    (54, "Emerald Green", "#00673E"),
    (55, "Purple", "#4E2990"),
    (56, "Moss Green", "#2F7E20"),
    (57, "Flesh Pink", "#FFCCCC"),
    (58, "Harvest Gold", "#FFD911"),
    (59, "Electric Blue", "#095BA6"),
    (60, "Lemon Yellow", "#F0F970"),
    (61, "Fresh Green", "#E3F35B"),
    (62, "Orange", "#FF9900"),
    (63, "Cream Yellow", "#FFF08D"),
    (64, "Applique", "#FFC8C8"),
];

/// Cached PEC table with precomputed LAB values
pub struct PecPalette {
    threads: Vec<PecThread>,
    labs: Vec<Lab<D65, f32>>,
}

static CACHED_PALETTE: OnceLock<PecPalette> = OnceLock::new();

impl PecPalette {
    pub fn global() -> &'static Self {
        CACHED_PALETTE.get_or_init(Self::new)
    }

    fn new() -> Self {
        let threads: Vec<PecThread> = PEC_THREADS
            .iter()
            .map(|(index, name, hex)| {
                let rgb = hex_to_rgb(hex).unwrap_or_default();
                let lab = rgb_to_lab(rgb);
                PecThread {
                    index: *index,
                    name: *name,
                    hex: rgb_to_hex(rgb),
                    rgb,
                    lab: [lab.l, lab.a, lab.b],
                }
            })
            .collect();

        let labs = threads
            .iter()
            .map(|t| Lab::new(t.lab[0], t.lab[1], t.lab[2]))
            .collect();

        Self { threads, labs }
    }

    pub fn threads(&self) -> &[PecThread] {
        &self.threads
    }

    /// Find the closest PEC thread using CIEDE2000 Delta-E (parallelized)
    pub fn find_closest(&self, rgb: [u8; 3]) -> &PecThread {
        let target = rgb_to_lab(rgb);
        let (idx, _) = self
            .labs
            .par_iter()
            .enumerate()
            .map(|(i, lab)| (i, target.difference(*lab)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((0, f32::MAX));

        &self.threads[idx]
    }
}

/// PEC table index for a design color.
pub fn closest_pec_index(rgb: [u8; 3]) -> u8 {
    PecPalette::global().find_closest(rgb).index
}

fn rgb_to_lab(rgb: [u8; 3]) -> Lab<D65, f32> {
    let srgb = Srgb::new(
        rgb[0] as f32 / 255.0,
        rgb[1] as f32 / 255.0,
        rgb[2] as f32 / 255.0,
    );
    Lab::from_color(srgb)
}
