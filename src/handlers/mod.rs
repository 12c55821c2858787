//! Request handlers for the service's external surfaces.

pub mod http;
