//! Public-share string derivation.
//!
//! Pure formatting: no validation of the URLs themselves.

/// Query parameter appended to a public share URL to start playback.
pub const AUTOPLAY_PARAM: &str = "autoplay=1";

/// Fixed iframe dimensions of the embedded player.
pub const EMBED_WIDTH: u32 = 1280;
pub const EMBED_HEIGHT: u32 = 720;

/// Derived fields present only for publicly shared cameras.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicShare {
    pub live_feed_url: String,
    pub embedded_markup: String,
}

/// `https://x/y` -> `https://x/y?autoplay=1`; an existing query gets `&autoplay=1`.
pub fn live_feed_url(share_url: &str) -> String {
    let sep = if share_url.contains('?') { '&' } else { '?' };
    format!("{share_url}{sep}{AUTOPLAY_PARAM}")
}

/// Embedded player fragment with `src` substituted.
pub fn embedded_markup(src: &str) -> String {
    format!(
        "<iframe type=\"text/html\" frameborder=\"0\" width=\"{EMBED_WIDTH}\" height=\"{EMBED_HEIGHT}\" src=\"{}\" allowfullscreen></iframe>",
        escape_attr(src)
    )
}

/// Both derived fields, or `None` unless sharing is enabled and the share URL
/// is non-empty. URLs are used exactly as delivered. The iframe points at
/// `web_url`, falling back to the share URL.
pub fn public_share(
    sharing_enabled: bool,
    share_url: Option<&str>,
    web_url: Option<&str>,
) -> Option<PublicShare> {
    if !sharing_enabled {
        return None;
    }
    let share_url = share_url.filter(|s| !s.is_empty())?;
    let embed_src = web_url.filter(|s| !s.is_empty()).unwrap_or(share_url);

    Some(PublicShare {
        live_feed_url: live_feed_url(share_url),
        embedded_markup: embedded_markup(embed_src),
    })
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoplay_appended_with_question_mark() {
        assert_eq!(live_feed_url("https://x/y"), "https://x/y?autoplay=1");
    }

    #[test]
    fn autoplay_appended_to_existing_query() {
        assert_eq!(
            live_feed_url("https://x/y?token=abc"),
            "https://x/y?token=abc&autoplay=1"
        );
    }

    #[test]
    fn embedded_markup_uses_fixed_template() {
        assert_eq!(
            embedded_markup("https://home.nest.com/camera/1"),
            "<iframe type=\"text/html\" frameborder=\"0\" width=\"1280\" height=\"720\" \
             src=\"https://home.nest.com/camera/1\" allowfullscreen></iframe>"
        );
    }

    #[test]
    fn embedded_markup_escapes_attribute_breakers() {
        let markup = embedded_markup("https://x/\"><script>");
        assert!(!markup.contains("\"><script>"));
        assert!(markup.contains("&quot;&gt;&lt;script&gt;"));
    }

    #[test]
    fn share_requires_enabled_flag() {
        assert_eq!(public_share(false, Some("https://x/y"), Some("https://w")), None);
    }

    #[test]
    fn share_requires_non_empty_url() {
        assert_eq!(public_share(true, None, Some("https://w")), None);
        assert_eq!(public_share(true, Some(""), Some("https://w")), None);
    }

    #[test]
    fn share_url_is_not_rewritten() {
        let s = public_share(true, Some(" https://x/y "), Some("")).unwrap();
        assert_eq!(s.live_feed_url, " https://x/y ?autoplay=1");
        assert!(s.embedded_markup.contains("src=\" https://x/y \""));
    }

    #[test]
    fn share_embeds_web_url_and_falls_back_to_share_url() {
        let s = public_share(true, Some("https://x/y"), Some("https://w/1")).unwrap();
        assert_eq!(s.live_feed_url, "https://x/y?autoplay=1");
        assert!(s.embedded_markup.contains("src=\"https://w/1\""));

        let s = public_share(true, Some("https://x/y"), None).unwrap();
        assert!(s.embedded_markup.contains("src=\"https://x/y\""));
    }
}
