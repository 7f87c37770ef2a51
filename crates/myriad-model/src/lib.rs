//! Myriad data model
//!
//! Properties are named values that carry several context-qualified revisions:
//!
//! ```text
//! Property "Latency"
//!   ├── Cluster "42"  { Region=US }              alice @ 100
//!   ├── Cluster "55"  { Region=EU }              bob   @ 120
//!   └── Cluster "60"  { Region=EU, Env=Prod }    bob   @ 130
//! ```
//!
//! A cluster is identified by its *measure set* (the unordered set of
//! dimension/value pairs it is tagged with), never by an assigned id. All
//! mutation is expressed as [`Operation`]s over clusters, batched into a
//! [`PropertyOperation`] and applied by the store.

pub mod cluster;
pub mod digest;
pub mod dimension;
pub mod epoch;
pub mod error;
pub mod measure;
pub mod operation;
pub mod property;

pub use cluster::Cluster;
pub use dimension::{Dimension, DimensionValues, PROPERTY_DIMENSION};
pub use epoch::Timestamp;
pub use error::ValidationError;
pub use measure::{Measure, MeasureSet};
pub use operation::{Operation, OperationKind, PropertyOperation};
pub use property::{Property, PropertyValue};
