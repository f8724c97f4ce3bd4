//! File-type eligibility.

use std::path::Path;

/// Extensions accepted as convertible raster images.
const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];

/// Check whether a path names a supported raster image.
///
/// Purely lexical: only the extension is inspected, case-insensitively. No
/// filesystem access happens here.
pub fn is_image_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|valid| ext.eq_ignore_ascii_case(valid))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_extension_is_accepted() {
        for ext in IMAGE_EXTENSIONS {
            let path = format!("photo.{ext}");
            assert!(is_image_file(Path::new(&path)), "rejected {path}");
        }
    }

    #[test]
    fn extension_case_is_ignored() {
        assert!(is_image_file(Path::new("photo.PNG")), "uppercase");
        assert!(is_image_file(Path::new("photo.Jpeg")), "mixed case");
    }

    #[test]
    fn other_files_are_rejected() {
        assert!(!is_image_file(Path::new("notes.txt")), "text file");
        assert!(!is_image_file(Path::new("archive.tar.gz")), "archive");
        assert!(!is_image_file(Path::new("photo")), "no extension");
        assert!(!is_image_file(Path::new(".png")), "hidden file without stem");
    }

    #[test]
    fn only_the_final_extension_counts() {
        assert!(is_image_file(Path::new("backup.txt.png")), "ends in png");
        assert!(!is_image_file(Path::new("photo.png.bak")), "ends in bak");
    }
}
