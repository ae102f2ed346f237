//! Error types for scenehub
//!
//! - **HubError**: failures surfaced at the room boundary and reported to the
//!   submitting connection as `error{kind, message}`
//! - **StoreError**: failures of the persistent project store
//!
//! Nothing here propagates past a room into global state; the room actor maps
//! every `StoreError` to a `HubError` for the one operation that caused it.
//!
//! ```rust
//! use scenehub::errors::{HubError, StoreError};
//!
//! let err = HubError::RoomBackpressure { project_id: 3 };
//! assert!(err.is_retryable());
//! assert_eq!(err.kind(), "RoomBackpressure");
//!
//! let store_err = StoreError::NotFound(3);
//! assert_eq!(HubError::from(store_err), HubError::ProjectNotFound(3));
//! ```

pub mod hub;
pub mod store;

pub use hub::HubError;
pub use store::StoreError;

/// Result type alias for hub operations
pub type HubResult<T> = Result<T, HubError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
