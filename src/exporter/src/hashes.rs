//! HMAC-SHA512 integrity manifest (`hashes.json`) of a hold bundle.

use std::collections::BTreeMap;

use bytes::Bytes;
use common::model::Hold;
use futures::TryStreamExt;
use hmac::{Hmac, Mac};
use object_store::path::Path;
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::bundle::{BundleLayout, BundleStore};
use crate::error::{ExportError, ExportResult};

type HmacSha512 = Hmac<Sha512>;

/// Bundle path to lowercase hex HMAC of the file's content.
pub type HashList = BTreeMap<String, String>;

fn new_mac(secret: &str) -> ExportResult<HmacSha512> {
    HmacSha512::new_from_slice(secret.as_bytes()).map_err(|_| ExportError::InvalidKey)
}

pub fn hash_bytes(secret: &str, data: &[u8]) -> ExportResult<String> {
    let mut mac = new_mac(secret)?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Hash an object by streaming it out of the store.
pub async fn hash_object(bundles: &BundleStore, secret: &str, path: &str) -> ExportResult<String> {
    let mut mac = new_mac(secret)?;
    let mut stream = bundles
        .object_store()
        .get(&Path::from(path))
        .await?
        .into_stream();
    while let Some(chunk) = stream.try_next().await? {
        mac.update(&chunk);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Read the manifest at `path`; a missing manifest is empty.
pub async fn read_manifest(bundles: &BundleStore, path: &str) -> ExportResult<HashList> {
    if !bundles.exists(path).await? {
        return Ok(HashList::new());
    }
    let data = bundles.read(path).await?;
    serde_json::from_slice(&data).map_err(|source| ExportError::HashesCorrupt {
        path: path.to_string(),
        source,
    })
}

/// Merge `entries` into the manifest at `path` and write it back. Existing
/// entries are kept unless `entries` carries the same path.
pub async fn write_manifest(
    bundles: &BundleStore,
    path: &str,
    entries: &HashList,
) -> ExportResult<HashList> {
    let mut manifest = read_manifest(bundles, path).await?;
    manifest.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));

    let data = serde_json::to_vec_pretty(&manifest)?;
    bundles.write(path, Bytes::from(data)).await?;
    Ok(manifest)
}

/// Outcome of re-hashing every file listed in a bundle's manifest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub verified: Vec<String>,
    pub mismatched: Vec<String>,
    pub missing: Vec<String>,
}

impl VerificationReport {
    pub fn is_intact(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty()
    }
}

/// Recompute the HMAC of every file listed in `hashes.json` and compare it
/// in constant time with the recorded value.
pub async fn verify_bundle(bundles: &BundleStore, hold: &Hold) -> ExportResult<VerificationReport> {
    let layout = BundleLayout::for_hold(hold);
    let manifest = read_manifest(bundles, &layout.hashes()).await?;
    let mut report = VerificationReport::default();

    for (path, expected) in &manifest {
        let actual = match hash_object(bundles, &hold.secret, path).await {
            Ok(actual) => actual,
            Err(ExportError::ObjectStore(object_store::Error::NotFound { .. })) => {
                tracing::warn!(hold_id = %hold.id, path = %path, "Bundle file missing");
                report.missing.push(path.clone());
                continue;
            }
            Err(e) => return Err(e),
        };

        if bool::from(actual.as_bytes().ct_eq(expected.as_bytes())) {
            report.verified.push(path.clone());
        } else {
            tracing::warn!(hold_id = %hold.id, path = %path, "Bundle file hash mismatch");
            report.mismatched.push(path.clone());
        }
    }

    Ok(report)
}
