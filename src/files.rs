use std::io::ErrorKind;
use std::path::Path;
use std::{fs, io};

use tokio::io::AsyncWriteExt;

/// Extensions treated as images, matched case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "svg"];

pub fn ensure_dir(path: impl AsRef<Path>) -> io::Result<()> {
    if !path.as_ref().exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

pub fn is_image(name: &str) -> bool {
    let Some(ext) = Path::new(name).extension() else {
        return false;
    };

    let Some(ext) = ext.to_str() else {
        return false;
    };

    let ext = ext.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

/// Repair filenames whose UTF-8 bytes were mis-decoded as a single-byte
/// encoding in transit. Anything that does not re-decode cleanly is returned
/// unchanged.
pub fn fix_encoding(name: &str) -> String {
    if !name.chars().all(|c| (c as u32) <= 0xFF) {
        return name.to_string();
    }

    let bytes = name.chars().map(|c| c as u8).collect::<Vec<_>>();

    String::from_utf8(bytes).unwrap_or_else(|_| name.to_string())
}

/// File names of all images directly inside `dir`, in directory order.
pub fn list_images(dir: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let mut images = vec![];

    for entry in fs::read_dir(dir)? {
        let entry = entry?;

        if !entry.file_type()?.is_file() {
            continue;
        }

        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };

        if is_image(&name) {
            images.push(name);
        }
    }

    Ok(images)
}

/// Names of all immediate subdirectories of `dir`, in directory order.
pub fn list_dirs(dir: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let mut dirs = vec![];

    for entry in fs::read_dir(dir)? {
        let entry = entry?;

        if !entry.file_type()?.is_dir() {
            continue;
        }

        if let Ok(name) = entry.file_name().into_string() {
            dirs.push(name);
        }
    }

    Ok(dirs)
}

/// Split `name.png` into (`name`, `.png`); extensionless names get an empty
/// suffix.
fn split_name(name: &str) -> (String, String) {
    let path = Path::new(name);

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    let stem = name
        .strip_suffix(&ext)
        .unwrap_or(name)
        .to_string();

    (stem, ext)
}

fn candidate_name(original: &str, stem: &str, ext: &str, counter: usize) -> String {
    if counter == 0 {
        original.to_string()
    } else {
        format!("{stem}({counter}){ext}")
    }
}

/// Write `bytes` under a collision-free variant of `name` inside `dir`.
/// Create-exclusive opens close the window between picking a name and
/// claiming it, so two concurrent uploads can never resolve to the same file.
pub async fn write_unique(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<String> {
    let (stem, ext) = split_name(name);

    let mut counter = 0usize;
    loop {
        let candidate = candidate_name(name, &stem, &ext, counter);

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&candidate))
            .await
        {
            Ok(mut file) => {
                file.write_all(bytes).await?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Collection and file names become filesystem paths, so reject anything
/// that could step outside the upload root.
pub fn valid_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && name != "."
        && name != ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extension_matching() {
        assert!(is_image("a.png"));
        assert!(is_image("a.JPG"));
        assert!(is_image("some.file.webp"));
        assert!(!is_image("a.txt"));
        assert!(!is_image("png"));
        assert!(!is_image("archive.png.zip"));
    }

    #[test]
    fn fix_encoding_repairs_mojibake() {
        // "é" (0xC3 0xA9) mis-decoded byte-per-byte.
        let garbled = "\u{c3}\u{a9}.png";
        assert_eq!(fix_encoding(garbled), "é.png");
    }

    #[test]
    fn fix_encoding_leaves_ascii_alone() {
        assert_eq!(fix_encoding("plain.png"), "plain.png");
    }

    #[test]
    fn fix_encoding_falls_back_on_invalid_sequences() {
        // 0xFF is not valid UTF-8 anywhere.
        let input = "a\u{ff}b.png";
        assert_eq!(fix_encoding(input), input);
    }

    #[test]
    fn fix_encoding_skips_already_wide_chars() {
        assert_eq!(fix_encoding("图片.png"), "图片.png");
    }

    #[test]
    fn split_extensionless() {
        assert_eq!(split_name("Makefile"), ("Makefile".into(), "".into()));
        assert_eq!(split_name("a.png"), ("a".into(), ".png".into()));
    }

    #[tokio::test]
    async fn write_unique_disambiguates() {
        let dir = tempfile::tempdir().unwrap();

        let first = write_unique(dir.path(), "f.png", b"1").await.unwrap();
        let second = write_unique(dir.path(), "f.png", b"2").await.unwrap();
        let third = write_unique(dir.path(), "f.png", b"3").await.unwrap();

        assert_eq!(first, "f.png");
        assert_eq!(second, "f(1).png");
        assert_eq!(third, "f(2).png");

        assert_eq!(std::fs::read(dir.path().join("f(2).png")).unwrap(), b"3");
    }

    #[test]
    fn name_validation() {
        assert!(valid_name("cats"));
        assert!(valid_name("my cats"));
        assert!(!valid_name("  "));
        assert!(!valid_name("a/b"));
        assert!(!valid_name(".."));
    }
}
