//! Core services: tenant lifecycle, stock ledger, packaging labels

pub mod blob_store;
pub mod google;
pub mod label;
pub mod label_engine;
pub mod stock_ledger;
pub mod tenant_lifecycle;
pub mod worker;

pub use blob_store::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use google::{DisabledIdentityProvider, GoogleClient, IdentityProvider};
pub use label::{LabelRenderer, PdfLabelRenderer};
pub use label_engine::{LabelEngine, RegenerateLabels, REGENERATE_LABELS_MIGRATION};
pub use stock_ledger::StockLedger;
pub use tenant_lifecycle::TenantLifecycle;
