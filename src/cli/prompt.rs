//! Interactive target prompt.

use console::{style, Term};

/// Ask for the category URL on the terminal. An empty answer selects `default`.
pub fn prompt_for_url(default: &str) -> anyhow::Result<String> {
    let term = Term::stdout();
    term.write_str(&format!(
        "{} ",
        style("Enter the category URL to scrape (press Enter for the default):").bold()
    ))?;
    let answer = term.read_line()?;
    Ok(resolve_url_answer(&answer, default))
}

pub fn resolve_url_answer(answer: &str, default: &str) -> String {
    match answer.trim() {
        "" => default.to_string(),
        url => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_answer_uses_default() {
        assert_eq!(resolve_url_answer("  \n", "https://www.olx.in/a"), "https://www.olx.in/a");
        assert_eq!(
            resolve_url_answer(" https://www.olx.in/b_c1 ", "https://www.olx.in/a"),
            "https://www.olx.in/b_c1"
        );
    }
}
