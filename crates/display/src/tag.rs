//! Item headers: `[BaseTag] [subTag] content`.

/// Render a managed item's full text.
pub fn render(base: &str, sub: &str, content: &str) -> String {
    format!("[{base}] [{sub}] {content}")
}

/// Whether `content` belongs to the reconciler with this base tag.
pub fn is_managed(base: &str, content: &str) -> bool {
    content
        .strip_prefix('[')
        .and_then(|rest| rest.strip_prefix(base))
        .is_some_and(|rest| rest.starts_with(']'))
}

/// Extract the sub tag from a managed item's text.
pub fn parse_sub_tag<'a>(base: &str, content: &'a str) -> Option<&'a str> {
    let rest = content
        .strip_prefix('[')?
        .strip_prefix(base)?
        .strip_prefix("] [")?;
    let end = rest.find(']')?;
    let sub = &rest[..end];
    is_valid_sub_tag(sub).then_some(sub)
}

/// Sub tags are non-empty and cannot contain brackets.
pub fn is_valid_sub_tag(sub: &str) -> bool {
    !sub.is_empty() && !sub.contains(['[', ']'])
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn render_then_parse() {
        let text = render("Players", "42", "Ana (online)");
        assert_eq!(text, "[Players] [42] Ana (online)");
        assert_eq!(parse_sub_tag("Players", &text), Some("42"));
    }

    #[rstest]
    #[case("[Players] [7] x", true, Some("7"))]
    #[case("[Players] [7]", true, Some("7"))]
    #[case("[Players]", true, None)]
    #[case("[Players] no tag", true, None)]
    #[case("[Players] [] empty", true, None)]
    #[case("[PlayersX] [7] other board", false, None)]
    #[case("[Status] [7] other board", false, None)]
    #[case("Players [7]", false, None)]
    fn headers(#[case] text: &str, #[case] managed: bool, #[case] sub: Option<&str>) {
        assert_eq!(is_managed("Players", text), managed);
        assert_eq!(parse_sub_tag("Players", text), sub);
    }
}
