mod dc;
mod error;
mod export;
mod factor;
mod fit;
mod kron;
mod loadcase;
mod network;
mod opt;
mod ptdf;
mod reduce;
mod select;
mod transaction;
mod ttc;
mod ybus;

pub mod debug;
pub mod math;
pub mod solver;
pub mod traits;

#[cfg(test)]
mod tests;

pub use dc::*;
pub use error::{ReductionError, Warning};
pub use export::*;
pub use factor::*;
pub use fit::*;
pub use kron::*;
pub use loadcase::*;
pub use network::*;
pub use opt::*;
pub use ptdf::*;
pub use reduce::*;
pub use select::*;
pub use transaction::*;
pub use ttc::*;
pub use ybus::*;
