pub mod audit;
pub mod common;
pub mod document;
pub mod payload;
pub mod principal;
pub mod schema;
pub mod tables;

pub use audit::*;
pub use common::*;
pub use document::*;
pub use payload::*;
pub use principal::*;
pub use schema::*;
