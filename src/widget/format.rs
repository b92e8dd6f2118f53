use once_cell::sync::Lazy;
use regex::Regex;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern"));
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^- (.*)$").expect("bullet pattern"));

/// Light markdown to HTML: `**bold**`, `- ` bullet lines, line breaks.
pub fn format_message(content: &str) -> String {
    let content = BOLD.replace_all(content, "<strong>$1</strong>");
    let content = BULLET.replace_all(&content, "<li>$1</li>");

    let content = if content.contains("<li>") {
        format!("<ul>{}</ul>", content)
    } else {
        content.into_owned()
    };

    content.replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(format_message("Hello there"), "Hello there");
    }

    #[test]
    fn bold_markers_become_strong() {
        assert_eq!(
            format_message("**Note:** read **this**"),
            "<strong>Note:</strong> read <strong>this</strong>"
        );
    }

    #[test]
    fn bullets_are_wrapped_in_a_list() {
        assert_eq!(
            format_message("Options:\n- reset password\n- contact us"),
            "<ul>Options:<br><li>reset password</li><br><li>contact us</li></ul>"
        );
    }

    #[test]
    fn dash_inside_a_line_is_not_a_bullet() {
        assert_eq!(format_message("a - b\nc"), "a - b<br>c");
    }
}
