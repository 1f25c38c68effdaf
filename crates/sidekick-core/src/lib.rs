pub mod actions;
pub mod approvals;
pub mod config;
pub mod error;
pub mod plan_parser;

pub use actions::*;
pub use approvals::*;
pub use config::*;
pub use error::*;
pub use plan_parser::*;
