pub mod auth;
pub mod credit;
pub mod paypal;
pub mod run;
pub mod settings;
pub mod shared;
pub mod upload;
pub mod webhook;
pub mod workflow;
