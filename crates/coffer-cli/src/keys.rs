//! Owner key files: one line of hex-encoded AES-256 key.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use coffer_cas::OwnerKey;
use zeroize::Zeroizing;

/// Read a hex key file. Surrounding whitespace is ignored.
pub fn read_key(path: &Path) -> Result<OwnerKey> {
    let text = Zeroizing::new(
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file {}", path.display()))?,
    );
    let bytes = Zeroizing::new(
        hex::decode(text.trim())
            .with_context(|| format!("Key file {} is not valid hex", path.display()))?,
    );
    let key = OwnerKey::try_from(bytes.as_slice())
        .with_context(|| format!("Key file {} has the wrong length", path.display()))?;
    Ok(key)
}

/// Write `key` as hex to a new file readable only by the current user.
/// Refuses to replace an existing file unless `force` is set.
pub fn write_key(path: &Path, key: &OwnerKey, force: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create key file {}", path.display()))?;
    let encoded = Zeroizing::new(hex::encode(key.as_bytes()));
    writeln!(file, "{}", encoded.as_str())?;
    file.sync_all()?;
    Ok(())
}
