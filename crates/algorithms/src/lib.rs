//! # Riparia Algorithms
//!
//! The valley-bottom evidence pipeline: transform configuration,
//! zone classification, streaming evidence composition, threshold
//! cleanup and polygon output, plus the raster preparation stages
//! around them.
//!
//! ## Modules
//!
//! - **transform**: Piecewise transform functions and the store loader
//! - **zones**: Drainage-area zone classification
//! - **evidence**: Combination expression and streaming compositor
//! - **threshold** / **clean**: Binarization and morphological cleanup
//! - **polygonize** / **sanitize**: Raster-to-vector output stages
//! - **hydrology**: Fill sinks, D8 flow, HAND
//! - **rasterize** / **proximity** / **buffer**: Criterion preparation
//! - **pipeline**: End-to-end orchestration

pub mod buffer;
pub mod clean;
pub mod evidence;
pub mod hydrology;
mod maybe_rayon;
pub mod pipeline;
pub mod polygonize;
pub mod proximity;
pub mod rasterize;
pub mod sanitize;
pub mod threshold;
pub mod transform;
pub mod zones;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::{buffer_by_field, buffer_geometry};
    pub use crate::clean::{clean, Clean, CleanParams};
    pub use crate::evidence::{
        compose, CombinationExpression, CombineOp, CombineStep, ComposeInputs, ComposeOutputs,
        EVIDENCE_NODATA,
    };
    pub use crate::hydrology::{
        drainage_mask_from_accumulation, fill_sinks, flow_accumulation, flow_direction, hand,
        FillSinks, FillSinksParams, FlowAccumulation, FlowDirection,
    };
    pub use crate::pipeline::{
        default_thresholds, run_pipeline, OutputLayout, PipelineInputs, PipelineParams,
        PipelineReport,
    };
    pub use crate::polygonize::polygonize;
    pub use crate::proximity::proximity;
    pub use crate::rasterize::{rasterize, BurnSource, RasterizeParams};
    pub use crate::sanitize::{sanitize, THRESHOLD_ATTRIBUTE};
    pub use crate::threshold::{threshold_file, threshold_raster, MASK_NODATA};
    pub use crate::transform::{
        load_configuration, Configuration, Criterion, CriterionTransforms, TransformFunction,
        TransformKind, TransformStore,
    };
    pub use crate::zones::{classify_zones, zone_index};
    pub use riparia_core::prelude::*;
}
