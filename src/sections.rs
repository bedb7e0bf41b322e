use crate::types::ArticleSections;

/// Best-effort split of unstructured text into the three named article
/// parts. Primary heuristic: group top-level markdown sections into three
/// roughly equal runs. Fallback when fewer than three top-level sections
/// exist: split paragraphs into three equal-count groups.
///
/// This is a fallback path, not a primary contract; explicit sections from
/// the pipeline always take precedence.
pub fn split_into_three(text: &str) -> ArticleSections {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ArticleSections {
            introduction: String::new(),
            body: String::new(),
            conclusion: String::new(),
        };
    }

    let sections = top_level_sections(trimmed);
    let parts = if sections.len() >= 3 {
        chunk_into_three(&sections)
    } else {
        let paragraphs: Vec<String> = trimmed
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        chunk_into_three(&paragraphs)
    };

    ArticleSections {
        introduction: parts[0].clone(),
        body: parts[1].clone(),
        conclusion: parts[2].clone(),
    }
}

/// Split on top-level markdown headings (`# ` / `## `), keeping each
/// heading with the text beneath it.
fn top_level_sections(text: &str) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        let is_heading = line.starts_with("# ") || line.starts_with("## ");
        if is_heading && !current.trim().is_empty() {
            sections.push(current.trim().to_string());
            current = String::new();
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(current.trim().to_string());
    }
    sections
}

/// Distribute ordered chunks into three runs of roughly equal count,
/// front-loading the remainder so earlier parts are never shorter.
fn chunk_into_three(chunks: &[String]) -> [String; 3] {
    match chunks.len() {
        0 => [String::new(), String::new(), String::new()],
        1 => [chunks[0].clone(), String::new(), String::new()],
        2 => [chunks[0].clone(), chunks[1].clone(), String::new()],
        n => {
            let base = n / 3;
            let remainder = n % 3;
            let first = base + usize::from(remainder > 0);
            let second = base + usize::from(remainder > 1);
            [
                chunks[..first].join("\n\n"),
                chunks[first..first + second].join("\n\n"),
                chunks[first + second..].join("\n\n"),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_headings() {
        let text = "# Intro\nopening words\n\n# Middle\nmain content\n\n# More\nextra\n\n# End\nclosing";
        let sections = split_into_three(text);
        assert!(sections.introduction.contains("Intro"));
        assert!(sections.introduction.contains("Middle"));
        assert!(sections.body.contains("More"));
        assert!(sections.conclusion.contains("End"));
    }

    #[test]
    fn falls_back_to_paragraph_split() {
        let text = "one\n\ntwo\n\nthree\n\nfour\n\nfive\n\nsix";
        let sections = split_into_three(text);
        assert_eq!(sections.introduction, "one\n\ntwo");
        assert_eq!(sections.body, "three\n\nfour");
        assert_eq!(sections.conclusion, "five\n\nsix");
    }

    #[test]
    fn uneven_paragraph_counts_front_load() {
        let text = "a\n\nb\n\nc\n\nd";
        let sections = split_into_three(text);
        assert_eq!(sections.introduction, "a\n\nb");
        assert_eq!(sections.body, "c");
        assert_eq!(sections.conclusion, "d");
    }

    #[test]
    fn short_input_never_panics() {
        let sections = split_into_three("just one paragraph");
        assert_eq!(sections.introduction, "just one paragraph");
        assert!(sections.body.is_empty());
        assert!(sections.conclusion.is_empty());

        let empty = split_into_three("   ");
        assert!(empty.is_empty());
    }
}
