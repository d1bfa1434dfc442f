//! PTO raw data store
//!
//! Raw measurement files live in campaigns, one directory per campaign
//! under a common root. Campaigns and files carry metadata records; file
//! records inherit missing fields from their campaign.

pub mod campaign;
pub mod metadata;
pub mod store;

pub use campaign::{
    CAMPAIGN_METADATA_FILENAME, CacheStatus, Campaign, FILE_METADATA_SUFFIX, RawFiletype,
};
pub use metadata::RawMetadata;
pub use store::RawDataStore;
