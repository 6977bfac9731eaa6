//! Individual preprocessing steps

pub mod borders;
pub mod clahe;
pub mod crop;
pub mod denoise;
pub mod deskew;
pub mod dots;
pub mod levels;
pub mod lines;
pub mod projection;
pub mod punch_holes;
pub mod retinex;
pub mod threshold;
