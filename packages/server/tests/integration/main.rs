mod common;

mod credits;
mod polling;
mod upload;
mod webhook;
mod workflow;
