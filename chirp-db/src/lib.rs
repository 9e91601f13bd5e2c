pub mod client;
pub mod record;

pub use client::{DbClient, DbError};
