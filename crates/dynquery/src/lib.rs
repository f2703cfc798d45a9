//! Runtime-configured access to relational databases: connect with caller-supplied
//! credentials, then list tables and columns, page through rows and run SQL.
//!
//! Free-form SQL is executed verbatim with the privileges of the connected credentials
//! unless [`core::executor::SqlAccess`] restricts it.

pub mod adapters;
pub mod cli;
pub mod core;
pub mod error;
pub mod logging;
