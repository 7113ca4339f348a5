//! Data model for a single flash run

mod build;
mod device;
mod image;
mod outcome;
mod request;

pub use build::*;
pub use device::*;
pub use image::*;
pub use outcome::*;
pub use request::*;
