pub mod api;
#[cfg(feature = "app")]
pub mod app;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod duration;
pub mod error;
pub mod export;
pub mod format;
pub mod models;
#[cfg(feature = "oauth")]
pub mod oauth;
