//! Client manifest bundle rewriting
//!
//! The on-disk `manifest.zip` ships with a placeholder URL; the admin
//! surface serves a copy with the placeholder replaced by the configured
//! public base URL of this gateway.

use mxgate_core::{GatewayError, GatewayResult};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// On-disk bundle served at `GET /manifest.zip`.
pub const MANIFEST_PATH: &str = "manifest.zip";

/// The one entry whose content is rewritten.
pub const MANIFEST_ENTRY: &str = "zat/manifest.json";

/// URL baked into the shipped bundle.
pub const URL_PLACEHOLDER: &str = "https://mxgate.connector73.net";

/// Re-zip the bundle with the manifest entry's placeholder URL replaced
/// by `base_url`.
pub fn rewrite(bundle: &[u8], base_url: &str) -> GatewayResult<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(bundle))
        .map_err(|e| GatewayError::Internal(format!("manifest read: {}", e)))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| GatewayError::Internal(format!("manifest entry: {}", e)))?;
        let name = file.name().to_string();

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| GatewayError::Internal(format!("manifest entry {}: {}", name, e)))?;

        if name == MANIFEST_ENTRY {
            let text = String::from_utf8_lossy(&contents).replace(URL_PLACEHOLDER, base_url);
            contents = text.into_bytes();
        }

        writer
            .start_file(name.as_str(), SimpleFileOptions::default())
            .and_then(|()| writer.write_all(&contents).map_err(zip::result::ZipError::Io))
            .map_err(|e| GatewayError::Internal(format!("manifest write {}: {}", name, e)))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| GatewayError::Internal(format!("manifest close: {}", e)))?;
    Ok(cursor.into_inner())
}
