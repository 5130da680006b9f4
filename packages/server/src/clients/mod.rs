pub mod engine;
pub mod mailer;
pub mod paypal;
