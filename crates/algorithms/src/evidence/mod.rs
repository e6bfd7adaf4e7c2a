//! Evidence fusion
//!
//! The combination expression (which surfaces exist and how criteria
//! fold into them) and the streaming compositor that evaluates it
//! strip by strip.

mod compositor;
mod expression;

pub use compositor::{
    compose, ComposeInputs, ComposeOutputs, EVIDENCE_NODATA,
};
pub use expression::{CombinationExpression, CombineOp, CombineStep};
