pub mod chart;
pub mod config;
pub mod error;
pub mod grpc;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod status;
pub mod store;
