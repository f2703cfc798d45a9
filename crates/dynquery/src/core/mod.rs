pub mod context;
pub mod driver;
pub mod executor;
pub mod introspect;
pub mod limits;
pub mod orchestrator;
pub mod postgres;
pub mod registry;
pub mod sqlite;
pub mod types;
pub mod validate;
