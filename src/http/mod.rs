pub mod extractors;
pub mod routes;

pub use routes::router;
