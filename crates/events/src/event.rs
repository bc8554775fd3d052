use chrono::{DateTime, Utc};

/// A notification about a committed stock change.
///
/// Published only after the commit it describes; observers never see a
/// change that was rolled back.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, e.g. `stock.reservation.changed`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version; bump on breaking field changes.
    fn version(&self) -> u32;

    fn occurred_at(&self) -> DateTime<Utc>;
}
