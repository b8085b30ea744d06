//! Fenced code block extraction from markdown documents.

/// A fenced code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// First token of the info string, lower-cased.
    pub language: String,

    /// Value of a `name=` or `codeScriptName=` token in the info string.
    pub name: Option<String>,

    pub code: String,
}

/// All fenced code blocks of a document, in order. An unterminated block
/// runs to the end of the document.
pub fn code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some((fence, info)) = opening_fence(line) else {
            continue;
        };

        let mut code = Vec::new();
        for line in lines.by_ref() {
            if is_closing_fence(line, &fence) {
                break;
            }
            code.push(line);
        }

        let mut tokens = info.split_whitespace();
        let language = tokens
            .next()
            .map(|lang| lang.trim_matches(|c| c == '{' || c == '}' || c == '.').to_lowercase())
            .unwrap_or_default();
        let name = tokens.find_map(|token| {
            let (key, value) = token.split_once('=')?;
            matches!(key, "name" | "codeScriptName")
                .then(|| value.trim_matches(|c| c == '"' || c == '\'').to_string())
        });

        blocks.push(CodeBlock {
            language,
            name,
            code: code.join("\n"),
        });
    }

    blocks
}

/// Pick the block to evaluate: the first block named `selector`, or without
/// a selector the first block whose language is accepted.
pub fn select_block<'a>(
    blocks: &'a [CodeBlock],
    selector: Option<&str>,
    accepts: impl Fn(&str) -> bool,
) -> Option<&'a CodeBlock> {
    match selector {
        Some(selector) => blocks.iter().find(|b| b.name.as_deref() == Some(selector)),
        None => blocks.iter().find(|b| accepts(&b.language)),
    }
}

fn opening_fence(line: &str) -> Option<(String, &str)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }

    let info = rest[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some((marker.to_string().repeat(len), info))
}

fn is_closing_fence(line: &str, fence: &str) -> bool {
    let trimmed = line.trim();
    let Some(marker) = fence.chars().next() else {
        return false;
    };
    trimmed.len() >= fence.len() && trimmed.chars().all(|c| c == marker)
}
