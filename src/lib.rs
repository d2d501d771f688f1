//! hostpdr: BMC side of the PLDM host PDR exchange
//!
//! Fetches Platform Descriptor Records from host firmware with multipart
//! GetPDR, stores them as remote records in the BMC repository, merges the
//! host's entity associations into the BMC entity tree and keeps the host
//! state sensor map that platform event handling looks sensors up in.

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod fetch;
pub mod fru;
pub mod handler;
pub mod logging;
pub mod merge;
pub mod pdr;
pub mod replay;
pub mod report;
pub mod sensor;
pub mod service;
pub mod store;
pub mod transport;
pub mod tree;
pub mod types;

pub use config::{ConfigLoader, HostPdrConfig};
pub use error::{ApiError, FetchError, LookupError, PdrError, TransportError};
pub use handler::{CycleReport, HostPdrHandler};
pub use service::{HostPdrHandle, HostPdrService};
pub use transport::PldmTransport;
pub use types::{HostState, SensorEntry};
