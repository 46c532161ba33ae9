//! Content-addressed key generation shared by all backends.

/// Storage key for a content digest.
///
/// The two leading byte pairs of the digest become directories so no single
/// directory grows unbounded on the local backend.
pub fn content_key(content_id: &str, extension: &str) -> String {
    let (a, b) = if content_id.len() >= 4 && content_id.is_ascii() {
        (&content_id[0..2], &content_id[2..4])
    } else {
        ("00", "00")
    };
    let ext = extension.trim_start_matches('.').to_lowercase();
    if ext.is_empty() {
        format!("content/{}/{}/{}", a, b, content_id)
    } else {
        format!("content/{}/{}/{}.{}", a, b, content_id, ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fans_out_by_digest_prefix() {
        let id = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        assert_eq!(
            content_key(id, ".IFC"),
            format!("content/9f/86/{}.ifc", id)
        );
        assert_eq!(content_key(id, ""), format!("content/9f/86/{}", id));
    }
}
