pub mod auth;
pub mod credit;
pub mod health;
pub mod paypal;
pub mod run;
pub mod settings;
pub mod staging;
pub mod upload;
pub mod webhook;
pub mod workflow;
