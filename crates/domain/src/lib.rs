//! echopost domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `cleaner`, `postprocess`: text cleanup before and after generation
//! - `validator`: quality and safety checks for generated posts
//! - `rate_limit`: points budget bookkeeping
//! - `usecases`: Application use cases / business logic

pub mod cleaner;
pub mod model;
pub mod ports;
pub mod postprocess;
pub mod rate_limit;
pub mod usecases;
pub mod validator;

pub use model::*;
pub use ports::*;
