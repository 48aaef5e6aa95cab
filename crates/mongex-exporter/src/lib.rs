pub mod client;
pub mod collector;
pub mod exporter;
pub mod flatten;
pub mod handlers;
pub mod mongo;
pub mod namespace;
pub mod opts;
pub mod router;
pub mod special;
pub mod topology;

#[cfg(test)]
mod testing;

pub use client::{AdminClient, CollectionFilter, Connector, DatabaseFilter};
pub use exporter::Exporter;
pub use mongo::{MongoClient, MongoConnector};
pub use opts::ExporterOpts;
pub use router::exporter_router;
pub use topology::{TopologyInfo, TopologyRole};
