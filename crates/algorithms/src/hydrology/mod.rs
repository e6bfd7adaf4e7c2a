//! Terrain preparation for the HAND criterion
//!
//! The chain from a DEM and a rasterized drainage network to the
//! height-above-nearest-drainage input:
//! - Fill sinks: remove depressions so every cell drains
//! - Flow direction: D8 steepest-descent codes
//! - Flow accumulation: upstream cell counts (stream seeding fallback)
//! - HAND: elevation above the first drainage cell on the D8 path

pub(crate) mod fill_sinks;
pub(crate) mod flow_accumulation;
pub(crate) mod flow_direction;
mod hand;

pub use fill_sinks::{fill_sinks, FillSinks, FillSinksParams};
pub use flow_accumulation::{flow_accumulation, FlowAccumulation};
pub use flow_direction::{flow_direction, FlowDirection};
pub use hand::{drainage_mask_from_accumulation, hand};

/// D8 neighbor offsets, indexed to the direction codes (1=E, 2=NE, ..., 8=SE)
pub(crate) const D8_OFFSETS: [(isize, isize); 8] = [
    (0, 1),   // 1: E
    (-1, 1),  // 2: NE
    (-1, 0),  // 3: N
    (-1, -1), // 4: NW
    (0, -1),  // 5: W
    (1, -1),  // 6: SW
    (1, 0),   // 7: S
    (1, 1),   // 8: SE
];

/// Distance factors matching `D8_OFFSETS`
pub(crate) const D8_DIST: [f64; 8] = [
    1.0,
    std::f64::consts::SQRT_2,
    1.0,
    std::f64::consts::SQRT_2,
    1.0,
    std::f64::consts::SQRT_2,
    1.0,
    std::f64::consts::SQRT_2,
];

/// Nodata test shared by the chain (NaN convention plus declared sentinel)
pub(crate) fn is_nodata(value: f64, nodata: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    match nodata {
        Some(nd) => (value - nd).abs() < f64::EPSILON,
        None => false,
    }
}
