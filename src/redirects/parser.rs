//! `_redirects` file parsing.
//!
//! Line syntax: `FROM [TO] [STATUS[!]] [Key=v1,v2 ...]`. Blank lines and
//! `#` comments are ignored. A comment starts at a `#` that begins the
//! line or a token, so targets keep their fragments. A line whose second token is a status has an
//! empty target (status control only).

use std::fs;
use std::io;
use std::path::Path;

use crate::conditions::Condition;
use crate::redirects::rule::{apply_condition, RedirectParseError, RedirectRule, RedirectStatus};

/// Parse the contents of a `_redirects` file.
pub fn parse_redirects(content: &str) -> Result<Vec<RedirectRule>, RedirectParseError> {
    let mut rules = Vec::new();
    for (i, raw) in content.lines().enumerate() {
        let line = strip_comment(raw);
        if line.trim().is_empty() {
            continue;
        }
        let rule = parse_line(line).map_err(|e| RedirectParseError::Line {
            line: i + 1,
            source: Box::new(e),
        })?;
        rules.push(rule);
    }
    Ok(rules)
}

/// Read and parse a `_redirects` file. A missing file yields no rules.
pub fn load_redirects_file(path: &Path) -> Result<Vec<RedirectRule>, RedirectParseError> {
    match fs::read_to_string(path) {
        Ok(content) => parse_redirects(&content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(RedirectParseError::Source(format!("{}: {}", path.display(), e))),
    }
}

fn strip_comment(line: &str) -> &str {
    let mut after_space = true;
    for (i, c) in line.char_indices() {
        if c == '#' && after_space {
            return &line[..i];
        }
        after_space = c.is_whitespace();
    }
    line
}

fn parse_line(line: &str) -> Result<RedirectRule, RedirectParseError> {
    let mut tokens = line.split_whitespace();
    let from = tokens
        .next()
        .ok_or_else(|| RedirectParseError::Source(line.to_string()))?;

    let mut to = None;
    let mut status = None;
    let mut condition = Condition::default();

    for token in tokens {
        if status.is_none() {
            if let Ok(parsed) = token.parse::<RedirectStatus>() {
                status = Some(parsed);
                continue;
            }
        }
        if let Some((key, values)) = token.split_once('=') {
            if !key.starts_with('/') && !key.contains(':') {
                apply_condition(&mut condition, key, values.split(',').map(str::to_string))?;
                continue;
            }
        }
        if to.is_none() && status.is_none() {
            to = Some(token.to_string());
            continue;
        }
        return Err(RedirectParseError::Source(token.to_string()));
    }

    RedirectRule::new(
        from,
        to.unwrap_or_default(),
        status.unwrap_or_default(),
        Some(condition),
    )
}
