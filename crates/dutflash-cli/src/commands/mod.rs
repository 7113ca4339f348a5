//! Command implementations for dutflash

pub mod flash;
pub mod resolve;
pub mod show;

pub use flash::{flash, FlashArgs};
pub use resolve::resolve;
pub use show::show;
