pub mod error;
pub mod hydration;
pub mod memory;
pub mod model;
pub mod query;
pub mod route;
pub mod service;
pub mod snowflake;
pub mod util;
pub mod validation;
