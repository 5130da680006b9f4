pub mod cookie;
pub mod filename;
pub mod form;
pub mod hash;
pub mod jwt;
