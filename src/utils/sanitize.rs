// src/utils/sanitize.rs

/// Cleans author-supplied fiche HTML before it is stored.
///
/// Whitelist based (`ammonia` defaults): formatting tags such as `<b>`, `<p>`,
/// `<ul>` survive, `<script>`/`<iframe>` and event handler attributes do not.
pub fn sanitize_fiche_content(input: &str) -> String {
    ammonia::clean(input.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_formatting_and_drops_scripts() {
        let cleaned = sanitize_fiche_content(
            "  <p onclick=\"steal()\">Les <b>fractions</b></p><script>alert(1)</script>  ",
        );
        assert_eq!(cleaned, "<p>Les <b>fractions</b></p>");
    }
}
