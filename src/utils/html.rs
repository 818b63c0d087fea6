// src/utils/html.rs

/// Strips dangerous markup from author-supplied text (exam titles,
/// descriptions, question text) before it is stored.
///
/// Whitelist based: harmless formatting like <b> or <p> survives, while
/// <script>, <iframe> and event-handler attributes are removed.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

pub fn clean_optional(input: Option<String>) -> Option<String> {
    input.map(|s| clean_html(&s))
}
