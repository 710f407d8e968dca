//! Sorts newly-arrived HERMES science files from a staging bucket into
//! per-instrument buckets, diverting destination-key collisions to a
//! holding bucket. A source object is deleted only after its copy has been
//! confirmed at the destination.

pub mod audit;
pub mod config;
pub mod constants;
pub mod error;
pub mod fs_store;
pub mod intake;
pub mod logging;
pub mod notify;
pub mod parser;
pub mod routing;
pub mod sorter;
pub mod storage;
