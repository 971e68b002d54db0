use once_cell::sync::Lazy;
use regex::Regex;

static YOUTUBE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:https?://(?:www\.)?youtube\.com/(?:watch\?v=|embed/|v/|shorts/)|https?://youtu\.be/)[\w-]+",
    )
    .unwrap_or_else(|e| unreachable!("invalid YouTube URL pattern: {e}"))
});

/// Whether `url` has the host and path shape of a YouTube video link.
pub fn is_youtube_url(url: &str) -> bool {
    YOUTUBE_URL.is_match(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_known_shapes() {
        assert!(is_youtube_url("https://youtu.be/abc123"));
        assert!(is_youtube_url("http://youtu.be/abc123?t=42"));
        assert!(is_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://youtube.com/watch?v=dQw4w9WgXcQ&list=PL1"));
        assert!(is_youtube_url("https://www.youtube.com/embed/dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://www.youtube.com/v/dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://youtube.com/shorts/a-b_c"));
    }

    #[test]
    fn test_rejects_other_hosts() {
        assert!(!is_youtube_url("https://vimeo.com/abc123"));
        assert!(!is_youtube_url("https://example.com/?ref=youtube.com/watch?v=abc"));
        assert!(!is_youtube_url("https://notyoutube.com/watch?v=abc"));
        assert!(!is_youtube_url(""));
    }

    #[test]
    fn test_rejects_missing_or_empty_id() {
        assert!(!is_youtube_url("https://www.youtube.com/"));
        assert!(!is_youtube_url("https://www.youtube.com/watch?v="));
        assert!(!is_youtube_url("https://youtu.be/"));
        assert!(!is_youtube_url("https://www.youtube.com/channel/UC123"));
    }

    #[test]
    fn test_scheme_and_host_are_case_sensitive() {
        assert!(!is_youtube_url("HTTPS://youtu.be/abc"));
        assert!(!is_youtube_url("https://YouTube.com/watch?v=abc"));
        assert!(!is_youtube_url("youtube.com/watch?v=abc"));
    }
}
