//! Integration tests for attachment export
//!
//! Attachments referenced by exported posts are copied next to their message
//! batch and recorded in the hash manifest with the HMAC of their content.

use anyhow::Result;
use exporter::hashes::{hash_bytes, read_manifest};
use exporter::{BundleLayout, verify_bundle};
use object_store::path::Path;
use tests_integration::fixtures::ExportTestContext;
use tests_integration::{init_test_logging, test_settings};

#[tokio::test]
async fn test_attachments_copied_and_hashed() -> Result<()> {
    init_test_logging();

    let ctx = ExportTestContext::new_filesystem().await?;
    ctx.add_channel("dm", None, "u1__u2", "D").await?;
    ctx.add_user("u1", "alice").await?;
    ctx.add_membership("u1", "dm", 0, None).await?;

    ctx.add_file("f1", "data/2024/f1", "contract.pdf", b"signed contract")
        .await?;
    ctx.add_file("f2", "data/2024/f2", "gone.png", b"deleted later")
        .await?;
    ctx.add_file("f3", "data/2024/f3", "notes.txt", b"meeting notes")
        .await?;
    ctx.storage
        .object_store
        .delete(&Path::from("data/2024/f2"))
        .await?;

    ctx.add_post("p1", "dm", "u1", 1200, &["f1", "f2"]).await?;
    ctx.add_post("p2", "dm", "u1", 1300, &[]).await?;
    ctx.add_post("p3", "dm", "u1", 1400, &["f3"]).await?;

    let hold = ctx.create_hold("case-files", &["u1"], 1000, 2000, 1000).await?;
    ctx.job(test_settings()).run_at(5000).await?;
    let hold = ctx.hold(&hold.id).await?;
    let layout = BundleLayout::for_hold(&hold);

    // batch size 2: p1+p2 lead with p1, p3 leads its own batch
    let contract = layout.attachment("dm", 1200, "p1", "f1", "contract.pdf");
    let notes = layout.attachment("dm", 1400, "p3", "f3", "notes.txt");
    assert_eq!(ctx.bundles().read(&contract).await?, "signed contract");
    assert_eq!(ctx.bundles().read(&notes).await?, "meeting notes");
    assert!(
        !ctx.bundles()
            .exists(&layout.attachment("dm", 1200, "p1", "f2", "gone.png"))
            .await?
    );

    let manifest = read_manifest(&ctx.bundles(), &layout.hashes()).await?;
    assert_eq!(
        manifest[&contract],
        hash_bytes(&hold.secret, b"signed contract")?
    );
    // two batches, two attachments, the index
    assert_eq!(manifest.len(), 5);

    let index: common::model::Index =
        serde_json::from_slice(&ctx.bundles().read(&layout.index()).await?)?;
    assert_eq!(index.teams[0].id, common::model::DIRECT_MESSAGES_TEAM_ID);
    assert_eq!(index.teams[0].channels[0].channel_type, "D");

    assert!(verify_bundle(&ctx.bundles(), &hold).await?.is_intact());
    Ok(())
}
