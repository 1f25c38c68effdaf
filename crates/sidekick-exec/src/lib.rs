pub mod adapters;
pub mod contracts;
pub mod executor;
pub mod materializer;
pub mod runner;
pub mod sandbox;

pub use adapters::*;
pub use contracts::*;
pub use executor::*;
pub use materializer::*;
pub use runner::*;
pub use sandbox::*;
