pub mod image;
pub mod payment_status;
pub mod pricing;
pub mod run_status;
pub mod status_event;
pub mod storage;

pub use image::{ImageAction, ImageBadge, ImageFormat};
pub use payment_status::PaymentStatus;
pub use pricing::PriceTable;
pub use run_status::RunStatus;
pub use status_event::{EventSource, Severity, StatusEvent, resolve_status_event};
