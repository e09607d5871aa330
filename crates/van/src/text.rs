//! Turning the service's HTML message bodies back into plain text.

use std::sync::LazyLock;

use regex::Regex;

static MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)@<a.*?>(.*?)</a>").unwrap());

static TOPIC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#<a.*?>(.*?)</a>#").unwrap());

static LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a[^>]*?rel="nofollow" target="_blank">(.*?)</a>"#).unwrap()
});

/// Strip the anchors the service wraps around mentions, topics and links.
///
/// Text fetched with `format=html` can be quoted in a new status (a repost,
/// say) without sending markup back.
///
/// ```
/// use van::text::process_text;
///
/// let html = r##"hi @<a href="http://fanfou.com/bob" class="former">bob</a>, see #<a href="/q/rust">rust</a>#"##;
/// assert_eq!(process_text(html), "hi @bob, see #rust#");
/// ```
pub fn process_text(text: &str) -> String {
    let text = MENTION_REGEX.replace_all(text, "@${1}");
    let text = TOPIC_REGEX.replace_all(&text, "#${1}#");
    LINK_REGEX.replace_all(&text, "${1}").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(process_text("nothing to see"), "nothing to see");
    }

    #[test]
    fn links_keep_their_text() {
        let html = r#"read <a href="http://example.com/a" title="http://example.com/a" rel="nofollow" target="_blank">http://example.com/a</a> and <a href="http://example.com/b" rel="nofollow" target="_blank">b</a>"#;
        assert_eq!(process_text(html), "read http://example.com/a and b");
    }

    #[test]
    fn mixed_markup() {
        let html = r#"RT @<A HREF="http://fanfou.com/x">X</A> #<a href="/q/t">t</a>#"#;
        assert_eq!(process_text(html), "RT @X #t#");
    }
}
