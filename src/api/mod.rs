pub mod device_handlers;
pub mod error;
pub mod handlers;
pub mod principal_extractor;
pub mod routes;

pub use error::{ApiError, ErrorResponse};
pub use handlers::AppState;
pub use routes::*;
