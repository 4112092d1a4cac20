//! Restage - update staging sidecar for desktop applications
//! Downloads release archives and stages them for the host app to apply on restart

pub mod engine;
