//! Record codec: name rules, typed rdata and zone-file text

pub mod name;
pub mod rdata;
pub mod zonefile;

pub use rdata::{Rdata, RdataFields, RecordType, decode, encode};
pub use zonefile::{ImportSummary, LineError};
