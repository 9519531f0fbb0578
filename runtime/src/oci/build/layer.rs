//! Layer archive creation.
//!
//! Packages a directory tree as a gzip-compressed tar placed at a fixed
//! destination inside the image. Entries are written in lexical order with
//! normalized ownership, modes and timestamps, so the same tree always
//! produces the same bytes (and therefore the same layer digest).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bpack_core::error::{BuildError, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Media type of the layers produced here.
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// An immutable layer archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Path to the layer tar.gz file
    pub path: PathBuf,
    /// Destination inside the image (e.g., "/buildpacks/java/1.0.0")
    pub target: String,
    /// SHA256 of the compressed archive (hex, without "sha256:" prefix)
    pub digest: String,
    /// SHA256 of the uncompressed tar stream (hex, without "sha256:" prefix)
    pub diff_id: String,
    /// Compressed size in bytes
    pub size: u64,
}

impl Layer {
    /// Get the digest with "sha256:" prefix.
    pub fn prefixed_digest(&self) -> String {
        format!("sha256:{}", self.digest)
    }

    /// Get the diff_id with "sha256:" prefix.
    pub fn prefixed_diff_id(&self) -> String {
        format!("sha256:{}", self.diff_id)
    }
}

/// Create a tar.gz layer from an entire directory.
///
/// `src_dir` itself becomes `target` inside the image and everything below
/// it is placed underneath. Every entry is owned by `uid`:`gid`. Fails if
/// `output_path` already exists.
pub fn create_tgz(
    src_dir: &Path,
    target: &str,
    output_path: &Path,
    uid: u64,
    gid: u64,
) -> Result<Layer> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    if !src_dir.is_dir() {
        return Err(BuildError::NotFoundError(format!(
            "Layer source directory {} does not exist",
            src_dir.display()
        )));
    }

    // A layer file is written once; an existing file belongs to another layer.
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output_path)
        .map_err(|e| {
            BuildError::LayerError(format!(
                "Failed to create layer file {}: {}",
                output_path.display(),
                e
            ))
        })?;

    let compressed = DigestWriter::new(file);
    let encoder = GzEncoder::new(compressed, Compression::default());
    let uncompressed = DigestWriter::new(encoder);
    let mut builder = tar::Builder::new(uncompressed);

    let prefix = PathBuf::from(target.trim_start_matches('/'));
    add_tree_to_tar(&mut builder, src_dir, &prefix, uid, gid)?;

    let uncompressed = builder
        .into_inner()
        .map_err(|e| BuildError::LayerError(format!("Failed to finalize layer: {}", e)))?;
    let (encoder, diff_id, _) = uncompressed.into_parts();
    let compressed = encoder
        .finish()
        .map_err(|e| BuildError::LayerError(format!("Failed to finish gzip stream: {}", e)))?;
    let (mut file, digest, size) = compressed.into_parts();
    file.flush().map_err(|e| {
        BuildError::LayerError(format!(
            "Failed to flush layer file {}: {}",
            output_path.display(),
            e
        ))
    })?;

    tracing::debug!(
        layer = %output_path.display(),
        target = %target,
        digest = %digest,
        size,
        "Created layer"
    );

    Ok(Layer {
        path: output_path.to_path_buf(),
        target: target.to_string(),
        digest,
        diff_id,
        size,
    })
}

/// Walk `root` in lexical order and append every entry under `prefix`.
fn add_tree_to_tar<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    prefix: &Path,
    uid: u64,
    gid: u64,
) -> Result<()> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            BuildError::LayerError(format!(
                "Failed to read directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|e| BuildError::LayerError(format!("Failed to strip prefix: {}", e)))?;
        let tar_path = if relative.as_os_str().is_empty() {
            prefix.to_path_buf()
        } else {
            prefix.join(relative)
        };
        if tar_path.as_os_str().is_empty() {
            continue;
        }

        let metadata = entry.metadata().map_err(|e| {
            BuildError::LayerError(format!(
                "Failed to read metadata for {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut header = tar::Header::new_gnu();
        header.set_metadata_in_mode(&metadata, tar::HeaderMode::Deterministic);
        header.set_uid(uid);
        header.set_gid(gid);
        header.set_mtime(0);

        let file_type = entry.file_type();
        let appended = if file_type.is_dir() {
            builder.append_data(&mut header, &tar_path, std::io::empty())
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(path).map_err(|e| {
                BuildError::LayerError(format!(
                    "Failed to read symlink {}: {}",
                    path.display(),
                    e
                ))
            })?;
            builder.append_link(&mut header, &tar_path, &link)
        } else if file_type.is_file() {
            let mut file = File::open(path).map_err(|e| {
                BuildError::LayerError(format!("Failed to open {}: {}", path.display(), e))
            })?;
            builder.append_data(&mut header, &tar_path, &mut file)
        } else {
            tracing::debug!(path = %path.display(), "Skipping special file");
            continue;
        };

        appended.map_err(|e| {
            BuildError::LayerError(format!(
                "Failed to add {} to layer: {}",
                tar_path.display(),
                e
            ))
        })?;
    }

    Ok(())
}

/// Writer adapter that hashes and counts everything passing through.
struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Returns the inner writer, the hex SHA256 and the byte count.
    fn into_parts(self) -> (W, String, u64) {
        (self.inner, hex::encode(self.hasher.finalize()), self.written)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Compute SHA256 digest of raw bytes.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
