//! Transactional bookkeeping shared by handlers: run lifecycle, credits,
//! status log, result images and payments.

pub mod credit;
pub mod items;
pub mod payment;
pub mod run;
pub mod status;
