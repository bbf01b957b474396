use ammonia;

/// Clean HTML content using the ammonia library.
///
/// This employs a whitelist-based sanitization strategy: it preserves safe tags
/// (like <b>, <p>) while stripping dangerous tags (like <script>, <iframe>)
/// and malicious attributes (like onclick).
///
/// Applied to teacher-authored rich text (batch/lesson/quiz descriptions and
/// question text) before it is stored.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_tags() {
        let cleaned = clean_html("<p>hello</p><script>alert(1)</script>");
        assert_eq!(cleaned, "<p>hello</p>");
    }

    #[test]
    fn keeps_plain_text() {
        assert_eq!(clean_html("What is 2 + 2?"), "What is 2 + 2?");
    }
}
