use tracing::debug;
use url::Url;

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Post ids appear either as long numeric ids (15+ digits) or as the
/// base64-like shortcodes used in permalinks (8+ chars).
fn looks_like_post_id(input: &str) -> bool {
    if input.is_empty() || !input.chars().all(is_id_char) {
        return false;
    }
    if input.chars().all(|c| c.is_ascii_digit()) {
        return input.len() >= 15;
    }
    input.len() >= 8
}

/// Numeric Graph API ids are 15-20 digits.
pub fn validate_post_id(post_id: &str) -> bool {
    let trimmed = post_id.trim();
    (15..=20).contains(&trimmed.len()) && trimmed.chars().all(|c| c.is_ascii_digit())
}

pub fn is_threads_url(input: &str) -> bool {
    let lowered = input.to_lowercase();
    lowered.contains("threads.net") || lowered.contains("threads.com")
}

/// Pulls a post id out of the various inputs users paste: a bare id,
/// a `threads.net/@user/post/<id>` permalink, a `?post_id=` parameter,
/// or any URL ending in an id-like segment.
pub fn extract_post_id_from_url(input: &str) -> Option<String> {
    let cleaned = input.trim();
    if cleaned.is_empty() {
        return None;
    }

    if looks_like_post_id(cleaned) {
        debug!("Input is already a post id: {}", cleaned);
        return Some(cleaned.to_string());
    }

    let parsed = Url::parse(cleaned)
        .or_else(|_| Url::parse(&format!("https://{cleaned}")))
        .ok()?;

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    // threads.net/@username/post/<id>
    if let Some(pos) = segments.iter().position(|seg| *seg == "post") {
        if let Some(candidate) = segments.get(pos + 1) {
            if looks_like_post_id(candidate) {
                debug!("Extracted post id from permalink: {}", candidate);
                return Some((*candidate).to_string());
            }
        }
    }

    // ?post_id=<id> and spelling variants
    for (key, value) in parsed.query_pairs() {
        let key = key.to_lowercase().replace('-', "_");
        if (key == "post_id" || key == "postid") && looks_like_post_id(&value) {
            debug!("Extracted post id from query parameter: {}", value);
            return Some(value.into_owned());
        }
    }

    // Any trailing id-like segment
    if let Some(last) = segments.last() {
        if looks_like_post_id(last) && last.len() >= 8 {
            debug!("Extracted post id from trailing segment: {}", last);
            return Some((*last).to_string());
        }
    }

    // Long numeric run anywhere in the input, for legacy links
    let mut run = String::new();
    for c in cleaned.chars() {
        if c.is_ascii_digit() {
            run.push(c);
        } else {
            if run.len() >= 15 {
                break;
            }
            run.clear();
        }
    }
    if run.len() >= 15 {
        debug!("Extracted numeric post id: {}", run);
        return Some(run);
    }

    debug!("No post id found in input: {}", cleaned);
    None
}
