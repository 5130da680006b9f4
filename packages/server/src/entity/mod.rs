pub mod auth_token;
pub mod credit_transaction;
pub mod item_image;
pub mod item_image_staging;
pub mod item_note;
pub mod paypal_payment;
pub mod run_upload;
pub mod status_log;
pub mod user;
pub mod user_state;
pub mod workflow_run;
