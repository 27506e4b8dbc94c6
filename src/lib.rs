// Hazard Map - client core for a map of user-reported hazard events
//
// Reconciles three independent sources into one rendered marker set:
// - a permission-gated, one-shot device position for initial framing
// - a live feed of full snapshots from the remote "events" collection
// - user gestures that write to that same collection

// Feed logging macros - exported for use by other modules
#[macro_use]
pub mod macros;

pub mod config;
pub mod context;
pub mod dialog;
pub mod error;
pub mod feed;
pub mod interaction;
pub mod location;
pub mod model;
pub mod notice;
pub mod presenter;
pub mod state;
pub mod store;

#[cfg(feature = "desktop")]
pub mod shell;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AppConfig;
pub use context::{AppContext, Collaborators};
pub use error::{DialogError, PlatformError, PositionError, StoreError};
pub use model::{Coordinate, EventId, EventRecord, MarkerSet, Region, CATEGORY_OPTIONS};
pub use presenter::{MapPresenter, MapView};
pub use state::AppState;
