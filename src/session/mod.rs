//! Per-account session detection
//!
//! A [`SessionDetector`] is the single worker owning one account's state: it
//! consumes push notifications and fetched review records, infers session
//! boundaries (started / finished reviewing) from push events, timestamps,
//! idle timeouts and audit-failure timeouts, and fires the public domain
//! events. Exactly one detector runs per tracked account; the registry
//! enforces that invariant.

pub mod detector;
pub mod window;

pub use detector::{DetectorCommand, SessionDetector};
pub use window::SessionWindow;
