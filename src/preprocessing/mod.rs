//! Pixel-processing core
//!
//! Shared raster helpers plus the individual steps the processors dispatch to.

pub mod blobs;
pub mod channels;
pub mod color;
pub mod inpaint;
pub mod morphology;
pub mod steps;
