//! Domain types shared by every orchestration component.

pub mod alert;
pub mod health;
pub mod work_item;

pub use alert::{Alert, AlertType, Severity};
pub use health::{HealthReport, HealthState, HealthStatus};
pub use work_item::{ItemStatus, WorkItem};
