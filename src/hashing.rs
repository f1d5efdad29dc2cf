//! Perceptual hashing of catalog images.
//!
//! Each image gets a pair of 64-bit difference hashes: one over horizontal
//! gradients and one over vertical gradients. `ordersimilar:` sorts by the
//! summed hamming distance of both.

use anyhow::{anyhow, Context, Result};
use img_hash::{HashAlg, HasherConfig};
use rayon::prelude::*;
use std::path::Path;

use crate::db::{HashPair, SqliteDb};

/// Outcome of a hashing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashReport {
    pub hashed: usize,
    pub failed: usize,
}

fn gradient_hash(image: &img_hash::image::DynamicImage, alg: HashAlg) -> Result<u64> {
    let hasher = HasherConfig::new().hash_size(8, 8).hash_alg(alg).to_hasher();
    let hash = hasher.hash_image(image);
    let bytes: [u8; 8] = hash
        .as_bytes()
        .try_into()
        .map_err(|_| anyhow!("unexpected hash length {}", hash.as_bytes().len()))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Compute the horizontal/vertical gradient hash pair of an image file.
pub fn perceptual_pair(path: &Path) -> Result<HashPair> {
    let img = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    // Hashing only looks at an 8x9 grid, a small thumbnail is plenty
    let thumbnail = img.thumbnail(64, 64);
    let rgba = thumbnail.to_rgba8();
    let (width, height) = rgba.dimensions();

    let hashable = img_hash::image::RgbaImage::from_raw(width, height, rgba.into_raw())
        .ok_or_else(|| anyhow!("Failed to create image for hashing"))?;
    let hashable = img_hash::image::DynamicImage::ImageRgba8(hashable);

    Ok(HashPair::new(
        gradient_hash(&hashable, HashAlg::Gradient)?,
        gradient_hash(&hashable, HashAlg::VertGradient)?,
    ))
}

/// Hash every image that has no stored hash pair yet.
///
/// Decoding runs on a rayon pool of `threads` workers (0 = one per core);
/// results are written back on the calling thread.
pub fn hash_missing(db: &SqliteDb, image_dir: &Path, threads: usize) -> Result<HashReport> {
    let pending = db.images_without_hashes()?;
    if pending.is_empty() {
        return Ok(HashReport::default());
    }
    tracing::info!(count = pending.len(), "hashing images");

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let computed: Vec<(u64, Result<HashPair>)> = pool.install(|| {
        pending
            .par_iter()
            .map(|(id, location)| (*id, perceptual_pair(&image_dir.join(location))))
            .collect()
    });

    let mut report = HashReport::default();
    for (id, pair) in computed {
        match pair {
            Ok(pair) => {
                db.set_image_hashes(id, pair)?;
                report.hashed += 1;
            }
            Err(e) => {
                tracing::warn!(image_id = id, error = %e, "failed to hash image");
                report.failed += 1;
            }
        }
    }

    tracing::info!(hashed = report.hashed, failed = report.failed, "hashing complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::AssociationStore;
    use tempfile::tempdir;

    fn write_gradient(path: &Path, invert: bool) {
        let img = image::RgbImage::from_fn(32, 32, |x, y| {
            let v = ((x * 8) ^ (y * 3)) as u8;
            let v = if invert { 255 - v } else { v };
            image::Rgb([v, v, v])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_perceptual_pair_is_stable() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        write_gradient(&a, false);
        write_gradient(&b, false);

        let first = perceptual_pair(&a).unwrap();
        assert_eq!(first, perceptual_pair(&a).unwrap());
        assert_eq!(first.distance(&perceptual_pair(&b).unwrap()), 0);
    }

    #[test]
    fn test_perceptual_pair_missing_file() {
        let dir = tempdir().unwrap();
        assert!(perceptual_pair(&dir.path().join("nope.png")).is_err());
    }

    #[test]
    fn test_hash_missing_stores_pairs() {
        let dir = tempdir().unwrap();
        write_gradient(&dir.path().join("a.png"), false);
        write_gradient(&dir.path().join("b.png"), true);

        let db = SqliteDb::open_in_memory().unwrap();
        db.initialize().unwrap();
        let a = db.create_image("a", "a.png", 1).unwrap();
        db.create_image("b", "b.png", 1).unwrap();
        db.create_image("gone", "gone.png", 1).unwrap();

        let report = hash_missing(&db, dir.path(), 2).unwrap();
        assert_eq!(report, HashReport { hashed: 2, failed: 1 });
        assert!(db.image_hashes(a).unwrap().is_some());

        // Only the unreadable image is left to retry
        assert_eq!(db.images_without_hashes().unwrap().len(), 1);
    }
}
