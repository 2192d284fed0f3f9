use crate::error::{PodupError, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^source\s+['"]([^'"]+)['"]"#).expect("source pattern is valid")
});

static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:abstract_)?target\s*\(?\s*(?:['"]([^'"]+)['"]|:(\w+))\s*\)?\s*do\b"#)
        .expect("target pattern is valid")
});

static POD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^pod\s*\(?\s*['"]([^'"]+)['"]\s*(.*?)\)?$"#).expect("pod pattern is valid")
});

static OPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?::(\w+)\s*=>|(\w+):)\s*(.+)$").expect("option pattern is valid")
});

static BLOCK_OPENER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^(?:def|if|unless|case|begin|while|until|class|module)\b)|(?:\bdo\s*(?:\|[^|]*\|)?$)")
        .expect("block pattern is valid")
});

/// Options written after the requirement strings of a `pod` line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodOptions {
    pub git: Option<String>,
    pub tag: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub path: Option<String>,
    pub podspec: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodDeclaration {
    pub name: String,
    /// Requirement strings joined with `, `; `None` when unconstrained.
    pub requirement: Option<String>,
    pub options: PodOptions,
    /// Names of the enclosing `target` blocks.
    pub groups: BTreeSet<String>,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Podfile {
    /// `source` lines, in declaration order.
    pub sources: Vec<String>,
    pub pods: Vec<PodDeclaration>,
}

/// Line scanner for the Podfile DSL. It understands the declarative subset
/// (`source`, `target` blocks, `pod` lines) and skips everything else.
pub struct PodfileParser;

impl PodfileParser {
    pub fn parse(content: &str) -> Result<Podfile> {
        let mut podfile = Podfile::default();
        // one entry per open block; `Some` for target blocks
        let mut blocks: Vec<Option<String>> = Vec::new();

        for (idx, raw_line) in content.lines().enumerate() {
            let line_number = idx + 1;
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            if line == "end" || line.starts_with("end ") {
                if blocks.pop().is_none() {
                    tracing::debug!("Unbalanced 'end' on Podfile line {}", line_number);
                }
                continue;
            }

            if let Some(caps) = SOURCE_RE.captures(line) {
                podfile.sources.push(caps[1].to_string());
                continue;
            }

            if let Some(caps) = TARGET_RE.captures(line) {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().to_string());
                blocks.push(name);
                continue;
            }

            if line.starts_with("pod ") || line.starts_with("pod(") {
                let caps = POD_RE.captures(line).ok_or_else(|| {
                    PodupError::ManifestParsing(format!(
                        "Unreadable pod declaration on line {line_number}: {line}"
                    ))
                })?;
                let (requirement, options) = parse_arguments(&caps[2], line_number)?;
                podfile.pods.push(PodDeclaration {
                    name: caps[1].trim().to_string(),
                    requirement,
                    options,
                    groups: blocks.iter().flatten().cloned().collect(),
                    line: line_number,
                });
                continue;
            }

            if BLOCK_OPENER_RE.is_match(line) {
                blocks.push(None);
            }
        }

        if !blocks.is_empty() {
            tracing::warn!("Podfile has {} unclosed block(s)", blocks.len());
        }

        Ok(podfile)
    }
}

fn parse_arguments(arguments: &str, line: usize) -> Result<(Option<String>, PodOptions)> {
    let mut requirements = Vec::new();
    let mut options = PodOptions::default();

    for argument in split_arguments(arguments) {
        let argument = argument.trim();
        if argument.is_empty() {
            continue;
        }

        if let Some(text) = unquote(argument) {
            requirements.push(text.trim().to_string());
            continue;
        }

        let Some(caps) = OPTION_RE.captures(argument) else {
            return Err(PodupError::ManifestParsing(format!(
                "Unexpected argument '{argument}' on line {line}"
            )));
        };
        let key = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        let value = unquote(caps[3].trim()).map(str::to_string);

        match key {
            "git" => options.git = value,
            "tag" => options.tag = value,
            "branch" => options.branch = value,
            "commit" => options.commit = value,
            "path" => options.path = value,
            "podspec" => options.podspec = value,
            "source" => options.source = value,
            // :subspecs, :configurations, :modular_headers, ...
            _ => {}
        }
    }

    let requirement = requirements
        .into_iter()
        .filter(|r| !r.is_empty())
        .collect::<Vec<_>>();
    let requirement = (!requirement.is_empty()).then(|| requirement.join(", "));
    Ok((requirement, options))
}

/// Splits on commas outside quotes and brackets. The leading comma after the
/// pod name yields an empty first part.
fn split_arguments(arguments: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for ch in arguments.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(ch),
            (None, '[' | '{') => depth += 1,
            (None, ']' | '}') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    parts.push(current);
    parts
}

fn unquote(text: &str) -> Option<&str> {
    let text = text.trim();
    ['\'', '"'].into_iter().find_map(|q| {
        text.strip_prefix(q)
            .and_then(|rest| rest.strip_suffix(q))
    })
}

fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (idx, ch) in line.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(ch),
            (None, '#') => return &line[..idx],
            _ => {}
        }
    }
    line
}
