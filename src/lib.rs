pub mod calendar;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod seed;
pub mod slot;
pub mod sql;
pub mod tls;
pub mod wire;
