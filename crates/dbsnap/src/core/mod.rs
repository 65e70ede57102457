//! Core abstractions shared by backup, restore, and the store drivers.
//!
//! - [`schema`]: reflected and rebuilt table metadata
//! - [`value`]: owned SQL values and rows
//! - [`traits`]: store, connector, and dialect traits
//! - [`observer`]: progress and warning events

pub mod observer;
pub mod schema;
pub mod traits;
pub mod value;

pub use observer::{Event, Observer, TracingObserver};
pub use schema::{Column, ColumnDef, ForeignKey, ForeignKeyRef, Index, IndexDef, Table, TableDef};
pub use traits::{Dialect, Store, StoreConnector};
pub use value::{Row, SqlValue};
