//! Local private key persistence.

use std::path::Path;

use tokio::fs;

/// Write private key material, readable by the owner only.
///
/// An existing file at `path` belongs to a key pair that no longer exists
/// remotely and is replaced.
pub async fn write_private_key(path: &Path, material: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    // A previous key file is usually read-only; removing it only needs
    // write access to the directory.
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    fs::write(path, material).await?;
    restrict_permissions(path).await
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o400)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    let mut perms = fs::metadata(path).await?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms).await
}
