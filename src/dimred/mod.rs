//! # Dimensionality Reduction
//!
//! Linear projections used to inspect batch structure.
//!
//! ## Currently Available
//! - **PCA** ([`pca`]): Principal Component Analysis on dense matrices, backed by
//!   an exact or a randomized truncated SVD

pub mod pca;
