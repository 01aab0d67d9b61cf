use std::path::Path;

use tracing::warn;

use crate::error::PicbedError;
use crate::files;

/// Outcome of resolving one uploaded file. Skips are not errors: a mixed
/// batch of valid and invalid files still succeeds for the valid part, and
/// the caller detects the undercount from the response.
#[derive(Debug, PartialEq, Eq)]
pub enum Stored {
    Written(String),
    Skipped,
}

/// Resolve and persist one uploaded file into `dir`.
///
/// The client-declared name is repaired first (multipart transports tend to
/// mis-tag multi-byte names as a single-byte encoding), then gated on the
/// MIME allow-list, then written either verbatim (`replace`) or under a
/// collision-free `name(n).ext` variant.
pub async fn store_file(
    dir: &Path,
    raw_name: &str,
    content_type: Option<&str>,
    bytes: &[u8],
    replace: bool,
    allowed_types: &[String],
) -> Result<Stored, PicbedError> {
    let fixed = files::fix_encoding(raw_name);

    // Strip any directory component a hostile client might smuggle in.
    let name = Path::new(&fixed)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    if name.is_empty() {
        warn!("Skipping upload with unusable filename: {raw_name:?}");
        return Ok(Stored::Skipped);
    }

    let mime = content_type.unwrap_or_default();
    if !allowed_types.iter().any(|t| t == mime) {
        warn!("Skipping invalid file: {name} ({mime})");
        return Ok(Stored::Skipped);
    }

    if replace {
        tokio::fs::write(dir.join(&name), bytes).await?;
        return Ok(Stored::Written(name));
    }

    let written = files::write_unique(dir, &name, bytes).await?;
    Ok(Stored::Written(written))
}

/// Exact-name conflict pre-check used before committing bytes. Only verbatim
/// matches count; collisions introduced by encoding repair are not predicted.
pub fn check_conflicts(dir: &Path, filenames: &[String]) -> Vec<String> {
    if !dir.exists() {
        return vec![];
    }

    let existing = files::list_images(dir).unwrap_or_default();

    filenames
        .iter()
        .filter(|name| existing.contains(name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALLOWED: [&str; 2] = ["image/png", "image/jpeg"];

    fn allowed() -> Vec<String> {
        ALLOWED.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn disambiguates_repeated_uploads() {
        let dir = tempfile::tempdir().unwrap();

        for expected in ["f.png", "f(1).png", "f(2).png"] {
            let stored = store_file(dir.path(), "f.png", Some("image/png"), b"x", false, &allowed())
                .await
                .unwrap();
            assert_eq!(stored, Stored::Written(expected.to_string()));
        }
    }

    #[tokio::test]
    async fn replace_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();

        store_file(dir.path(), "f.png", Some("image/png"), b"old", true, &allowed())
            .await
            .unwrap();
        let stored = store_file(dir.path(), "f.png", Some("image/png"), b"new", true, &allowed())
            .await
            .unwrap();

        assert_eq!(stored, Stored::Written("f.png".to_string()));
        assert_eq!(std::fs::read(dir.path().join("f.png")).unwrap(), b"new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn unsupported_mime_is_silently_skipped() {
        let dir = tempfile::tempdir().unwrap();

        let stored = store_file(dir.path(), "f.pdf", Some("application/pdf"), b"x", false, &allowed())
            .await
            .unwrap();

        assert_eq!(stored, Stored::Skipped);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn path_components_are_stripped() {
        let dir = tempfile::tempdir().unwrap();

        let stored = store_file(
            dir.path(),
            "../../evil.png",
            Some("image/png"),
            b"x",
            false,
            &allowed(),
        )
        .await
        .unwrap();

        assert_eq!(stored, Stored::Written("evil.png".to_string()));
        assert!(dir.path().join("evil.png").exists());
    }

    #[test]
    fn conflicts_are_exact_matches_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::fs::write(dir.path().join("b.png"), b"x").unwrap();

        let candidates = vec!["a.png".to_string(), "A.png".to_string(), "c.png".to_string()];
        assert_eq!(check_conflicts(dir.path(), &candidates), vec!["a.png"]);
    }

    #[test]
    fn conflicts_on_missing_collection_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        assert!(check_conflicts(&missing, &["a.png".to_string()]).is_empty());
    }
}
