/// Replace `${ENV_VAR}` placeholders in raw config text.
///
/// Unresolvable variables are left as-is so validation can point at them.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Placeholder expansion with an injectable lookup.
pub(crate) fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            // Empty or unterminated placeholder: emit literally.
            _ => {
                out.push_str("${");
                rest = after;
            },
        }
    }
    out.push_str(rest);
    out
}

/// Placeholders that survived substitution, for diagnostics.
pub fn unresolved_placeholders(input: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                if end > 0 {
                    names.push(after[..end].to_string());
                }
                rest = &after[end + 1..];
            },
            None => break,
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HERALD_CHANNEL" => Some("12345".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_with("targets = [\"channel:${HERALD_CHANNEL}\"]", lookup),
            "targets = [\"channel:12345\"]"
        );
    }

    #[test]
    fn leaves_unknown_and_malformed() {
        assert_eq!(substitute_with("${NOPE} and ${}", lookup), "${NOPE} and ${}");
        assert_eq!(substitute_with("tail ${OPEN", lookup), "tail ${OPEN");
    }

    #[test]
    fn reports_unresolved() {
        let text = substitute_with("a=${HERALD_CHANNEL} b=${MISSING}", lookup);
        assert_eq!(unresolved_placeholders(&text), vec!["MISSING".to_string()]);
    }
}
