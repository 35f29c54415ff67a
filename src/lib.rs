//! Reflectance of planar anisotropic multilayers with the 4x4 Berreman
//! transfer-matrix method.
//!
//! A stack is a coupling prism, any number of finite air gaps and crystal
//! layers, and a semi-infinite exit medium. For every point of a sweep over
//! frequency, angles, crystal rotations and thickness, each layer is turned
//! into a 4x4 matrix acting on the tangential field `[Ex, Ey, Hx, Hy]`, the
//! matrices are multiplied top to bottom, and the 2x2 reflection matrix is
//! read off the product.

pub mod ambient;
pub mod config;
pub mod dispersion;
pub mod eigen;
pub mod layer;
pub mod material;
pub mod modes;
pub mod output;
pub mod propagation;
pub mod reflection;
pub mod settings;
pub mod structure;
pub mod sweep;
pub mod tensor;
