//! Packaging label engine
//!
//! Creating a packaging allocates a unique EAN-8, renders the label, uploads
//! the PDF and PNG preview, and only then inserts the row. Label artifacts
//! change only through re-rendering; the EAN-8 is kept once written.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Acquire, PgConnection};
use stockroom_common::db::ImperativeMigration;
use stockroom_common::ean::{generate_ean8, is_valid_ean8};
use stockroom_common::time::SharedClock;
use stockroom_common::{Error, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::blob_store::{preview_ttl, BlobStore, PUBLIC_PREFIX};
use super::label::{LabelContent, LabelRenderer};
use crate::db::{items, packagings, stores, units};
use crate::models::{CreatePackagingPayload, ItemPackaging, LabelSubject, SignedUrl, UpdatePackagingPayload};

/// Fresh UUIDs tried before giving up on a free EAN-8
const MAX_CODE_ATTEMPTS: usize = 8;

/// Quantities closer than this are the same quantity
const QUANTITY_TOLERANCE: f64 = 1e-6;

/// Name of the tenant migration step that backfills labels
pub const REGENERATE_LABELS_MIGRATION: &str = "00010_regenerate_packaging_labels";

/// URLs of one uploaded label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelUrls {
    pub pdf: String,
    pub preview: String,
}

/// Blob keys for a packaging label: `(pdf, png)`
pub fn label_keys(namespace_id: &str, uuid: &Uuid) -> (String, String) {
    let base = format!("{}{}/{}", PUBLIC_PREFIX, namespace_id, uuid);
    (format!("{}.pdf", base), format!("{}.png", base))
}

fn content_for(subject: &LabelSubject, ean_8: &str) -> LabelContent {
    LabelContent {
        store_name: subject.store_name.clone(),
        item_description: subject.item_description.clone(),
        packaging_description: subject.packaging_description.clone(),
        quantity: subject.quantity,
        unit: subject.unit_description.clone(),
        ean_8: ean_8.to_string(),
    }
}

pub struct LabelEngine {
    renderer: Arc<dyn LabelRenderer>,
    blobs: Arc<dyn BlobStore>,
    clock: SharedClock,
}

impl LabelEngine {
    pub fn new(renderer: Arc<dyn LabelRenderer>, blobs: Arc<dyn BlobStore>, clock: SharedClock) -> Self {
        Self { renderer, blobs, clock }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Pick a UUID whose EAN-8 is not yet used in the pinned namespace
    async fn allocate_code(
        &self,
        conn: &mut PgConnection,
        description: &str,
        except_id: Option<i64>,
    ) -> Result<(Uuid, String)> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let uuid = Uuid::new_v4();
            let code = match generate_ean8(&uuid, description) {
                Ok(code) => code,
                Err(Error::Ean8GenerationFailed(reason)) => {
                    debug!(attempt, %uuid, "EAN-8 generation failed: {}", reason);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !packagings::ean8_taken(conn, &code, except_id).await? {
                return Ok((uuid, code));
            }
            warn!(attempt, ean_8 = %code, "EAN-8 collision, retrying with a new UUID");
        }
        Err(Error::Ean8GenerationFailed(format!(
            "no free EAN-8 after {} attempts",
            MAX_CODE_ATTEMPTS
        )))
    }

    /// Render and upload both artifacts
    pub async fn upload(&self, namespace_id: &str, uuid: &Uuid, content: &LabelContent) -> Result<LabelUrls> {
        let rendered = self.renderer.render(content)?;
        let (pdf_key, png_key) = label_keys(namespace_id, uuid);
        let pdf = self.blobs.put(&pdf_key, rendered.pdf, "application/pdf").await?;
        let preview = self.blobs.put(&png_key, rendered.png, "image/png").await?;
        Ok(LabelUrls { pdf, preview })
    }

    /// Create a packaging with its label
    ///
    /// Blobs are uploaded before the insert; a failed insert leaves them
    /// orphaned.
    pub async fn create_packaging(
        &self,
        conn: &mut PgConnection,
        namespace_id: &str,
        store_id: i64,
        created_by: i64,
        payload: &CreatePackagingPayload,
    ) -> Result<ItemPackaging> {
        let item = match items::get(conn, store_id, payload.item_id).await {
            Err(Error::NotFound(_)) => {
                return Err(Error::UnprocessableEntity(format!(
                    "item {} does not belong to store {}",
                    payload.item_id, store_id
                )))
            }
            other => other?,
        };
        let unit = units::get(conn, store_id, item.unit_of_measure_id).await?;
        let store = stores::get(conn, store_id).await?;

        let (uuid, ean_8) = self.allocate_code(conn, &payload.description, None).await?;
        let content = LabelContent {
            store_name: store.name,
            item_description: item.description,
            packaging_description: payload.description.trim().to_string(),
            quantity: payload.quantity,
            unit: unit.description,
            ean_8: ean_8.clone(),
        };
        let urls = self.upload(namespace_id, &uuid, &content).await?;

        let packaging = packagings::insert(
            conn,
            &packagings::NewPackaging {
                uuid,
                item_id: item.id,
                description: &payload.description,
                quantity: payload.quantity,
                ean_8: &ean_8,
                label_pdf_url: &urls.pdf,
                label_preview_url: &urls.preview,
            },
            created_by,
        )
        .await?;

        info!(packaging_id = packaging.id, ean_8 = %ean_8, "Packaging created");
        Ok(packaging)
    }

    /// Change description or quantity and re-render with the same EAN-8
    ///
    /// Quantity is frozen once any stock movement uses the packaging.
    pub async fn update_packaging(
        &self,
        conn: &mut PgConnection,
        namespace_id: &str,
        store_id: i64,
        id: i64,
        payload: &UpdatePackagingPayload,
    ) -> Result<ItemPackaging> {
        packagings::get(conn, store_id, id).await?;

        let mut tx = conn.begin().await?;
        let current = packagings::lock_quantity(&mut tx, id).await?;
        let quantity_changed = (current - payload.quantity).abs() > QUANTITY_TOLERANCE;
        if quantity_changed && packagings::used_in_movements(&mut tx, id).await? {
            return Err(Error::ConflictingState(format!(
                "packaging {} is used by stock movements; its quantity cannot change",
                id
            )));
        }
        packagings::update_fields(&mut tx, id, &payload.description, payload.quantity).await?;
        let packaging = self.render_existing(&mut tx, namespace_id, id).await?;
        tx.commit().await?;
        Ok(packaging)
    }

    /// Re-render the label of packaging `id` in `store_id`
    pub async fn regenerate(
        &self,
        conn: &mut PgConnection,
        namespace_id: &str,
        store_id: i64,
        id: i64,
    ) -> Result<ItemPackaging> {
        packagings::get(conn, store_id, id).await?;
        let mut tx = conn.begin().await?;
        let packaging = self.render_existing(&mut tx, namespace_id, id).await?;
        tx.commit().await?;
        Ok(packaging)
    }

    /// Render and bind label artifacts for an existing row
    ///
    /// Rows without a valid EAN-8 get a fresh code (and UUID).
    async fn render_existing(&self, conn: &mut PgConnection, namespace_id: &str, id: i64) -> Result<ItemPackaging> {
        let subject = packagings::label_subject(conn, id).await?;
        let (uuid, ean_8) = match subject.ean_8.as_deref() {
            Some(code) if is_valid_ean8(code) => (subject.uuid, code.to_string()),
            _ => self.code_for_legacy(conn, &subject).await?,
        };

        let urls = self.upload(namespace_id, &uuid, &content_for(&subject, &ean_8)).await?;
        packagings::set_label(conn, id, uuid, &ean_8, &urls.pdf, &urls.preview).await
    }

    /// Code derived from the row's own UUID when free, otherwise a fresh pair
    async fn code_for_legacy(&self, conn: &mut PgConnection, subject: &LabelSubject) -> Result<(Uuid, String)> {
        if let Ok(code) = generate_ean8(&subject.uuid, &subject.packaging_description) {
            if !packagings::ean8_taken(conn, &code, Some(subject.packaging_id)).await? {
                return Ok((subject.uuid, code));
            }
        }
        self.allocate_code(conn, &subject.packaging_description, Some(subject.packaging_id))
            .await
    }

    /// Signed, short-lived URL for the packaging's preview image
    pub async fn preview_url(&self, conn: &mut PgConnection, store_id: i64, id: i64) -> Result<SignedUrl> {
        let packaging = packagings::get(conn, store_id, id).await?;
        let url = packaging
            .label_preview_url
            .ok_or_else(|| Error::NotFound(format!("packaging {} has no label", id)))?;
        let key = self
            .blobs
            .key_from_url(&url)
            .ok_or_else(|| Error::Internal(format!("label URL of packaging {} is not served here", id)))?;
        Ok(self.blobs.signed_url(&key, self.clock.now() + preview_ttl()))
    }

    /// Fill in missing codes or label URLs for every packaging in the namespace
    pub async fn backfill(&self, conn: &mut PgConnection, namespace_id: &str) -> Result<usize> {
        let ids = packagings::missing_labels(conn).await?;
        for id in &ids {
            self.render_existing(conn, namespace_id, *id).await?;
        }
        Ok(ids.len())
    }
}

/// Tenant migration step that backfills packaging labels
pub struct RegenerateLabels {
    engine: Arc<LabelEngine>,
}

impl RegenerateLabels {
    pub fn new(engine: Arc<LabelEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ImperativeMigration for RegenerateLabels {
    async fn run(&self, conn: &mut PgConnection, namespace_id: &str) -> Result<()> {
        let count = self.engine.backfill(conn, namespace_id).await?;
        info!(namespace = namespace_id, count, "Packaging labels regenerated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::blob_store::MemoryBlobStore;
    use crate::services::label::{PdfLabelRenderer, RenderedLabel};
    use chrono::{TimeZone, Utc};
    use stockroom_common::time::FixedClock;

    struct FakeRenderer;

    impl LabelRenderer for FakeRenderer {
        fn render(&self, content: &LabelContent) -> Result<RenderedLabel> {
            Ok(RenderedLabel {
                pdf: format!("pdf:{}", content.ean_8).into_bytes(),
                png: format!("png:{}", content.ean_8).into_bytes(),
            })
        }
    }

    fn engine(renderer: Arc<dyn LabelRenderer>, blobs: Arc<MemoryBlobStore>) -> LabelEngine {
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        LabelEngine::new(renderer, blobs, clock)
    }

    fn content() -> LabelContent {
        LabelContent {
            store_name: "Main".to_string(),
            item_description: "Rice".to_string(),
            packaging_description: "Bag".to_string(),
            quantity: 5.0,
            unit: "kg".to_string(),
            ean_8: "96385074".to_string(),
        }
    }

    #[test]
    fn test_label_keys() {
        let uuid = Uuid::parse_str("0b7c3e2a-5d1f-4b7e-9a55-3c2f1e0d9a88").unwrap();
        let (pdf, png) = label_keys("org_acme", &uuid);
        assert_eq!(pdf, "labels/org_acme/0b7c3e2a-5d1f-4b7e-9a55-3c2f1e0d9a88.pdf");
        assert_eq!(png, "labels/org_acme/0b7c3e2a-5d1f-4b7e-9a55-3c2f1e0d9a88.png");
    }

    #[tokio::test]
    async fn test_upload_stores_both_artifacts() {
        let blobs = Arc::new(MemoryBlobStore::new("http://localhost/blobs"));
        let engine = engine(Arc::new(FakeRenderer), blobs.clone());
        let uuid = Uuid::new_v4();

        let urls = engine.upload("org_acme", &uuid, &content()).await.unwrap();

        assert_eq!(urls.pdf, format!("http://localhost/blobs/labels/org_acme/{}.pdf", uuid));
        assert_eq!(urls.preview, format!("http://localhost/blobs/labels/org_acme/{}.png", uuid));
        assert_eq!(blobs.keys().len(), 2);
        let png = blobs.get(&format!("labels/org_acme/{}.png", uuid)).await.unwrap().unwrap();
        assert_eq!(png.bytes, b"png:96385074");
        assert_eq!(png.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_upload_with_real_renderer() {
        let blobs = Arc::new(MemoryBlobStore::new("http://localhost/blobs"));
        let engine = engine(Arc::new(PdfLabelRenderer), blobs.clone());
        let uuid = Uuid::new_v4();

        engine.upload("org_acme", &uuid, &content()).await.unwrap();

        let pdf = blobs.get(&format!("labels/org_acme/{}.pdf", uuid)).await.unwrap().unwrap();
        assert!(pdf.bytes.starts_with(b"%PDF-1.4"));
    }

    #[tokio::test]
    async fn test_upload_rejects_invalid_code() {
        let blobs = Arc::new(MemoryBlobStore::new("http://localhost/blobs"));
        let engine = engine(Arc::new(PdfLabelRenderer), blobs.clone());
        let mut bad = content();
        bad.ean_8 = "1234567".to_string();

        assert!(engine.upload("org_acme", &Uuid::new_v4(), &bad).await.is_err());
        assert!(blobs.keys().is_empty());
    }
}
