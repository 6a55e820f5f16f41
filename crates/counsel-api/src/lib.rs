//! HTTP surface for counsel: request creation, conversation turns and
//! request inspection.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
