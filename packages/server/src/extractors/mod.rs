pub mod callback;
pub mod json;
pub mod session;
