//! E-CMS Core: domain models, error taxonomy, repository traits and the
//! collaborator seams (clock, notifier) shared by every other crate.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod repository;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PlatformConfig;
pub use error::{EcmsError, EcmsResult};
pub use notify::{Notifier, NotifyError};
