//! API Module
//!
//! HTTP handlers and routing for the cache admin and observability API.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `POST /invalidate` - Invalidate by event or keys
//! - `GET /metrics/cache/*` - Health, detailed and Prometheus metrics
//! - `GET /health` - Liveness endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
