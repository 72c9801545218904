use std::fmt;

use crate::error::{RenderError, RenderResult};

/// Output file stem with a single integer placeholder for the clip index.
///
/// Accepts `{}`, `{0}`, `{:N}`, `{:0N}` (each optionally ending in `d`).
/// Literal braces are written `{{` and `}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    source: String,
    prefix: String,
    suffix: String,
    width: usize,
    zero_pad: bool,
}

impl NameTemplate {
    pub fn parse(template: &str) -> RenderResult<Self> {
        let malformed = |reason: &str| {
            RenderError::config(format!("name template '{}': {}", template, reason))
        };

        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut spec: Option<String> = None;
        let mut chars = template.chars().peekable();

        while let Some(ch) = chars.next() {
            let out = if spec.is_some() { &mut suffix } else { &mut prefix };
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    out.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    out.push('}');
                }
                '{' => {
                    if spec.is_some() {
                        return Err(malformed("more than one placeholder"));
                    }
                    let mut inner = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => inner.push(c),
                            None => return Err(malformed("unterminated placeholder")),
                        }
                    }
                    spec = Some(inner);
                }
                '}' => return Err(malformed("unmatched '}'")),
                c => out.push(c),
            }
        }

        let spec = spec.ok_or_else(|| malformed("missing '{}' placeholder for the clip index"))?;
        let (field, format) = spec.split_once(':').unwrap_or((spec.as_str(), ""));
        if !(field.is_empty() || field == "0") {
            return Err(malformed("placeholder must be positional ({} or {0})"));
        }
        let format = format.strip_suffix('d').unwrap_or(format);
        let zero_pad = format.len() > 1 && format.starts_with('0');
        let width = if format.is_empty() {
            0
        } else {
            format
                .parse::<usize>()
                .map_err(|_| malformed("unsupported format spec"))?
        };

        Ok(Self {
            source: template.to_string(),
            prefix,
            suffix,
            width,
            zero_pad,
        })
    }

    pub fn render(&self, index: usize) -> String {
        let number = if self.zero_pad {
            format!("{:0width$}", index, width = self.width)
        } else {
            format!("{:>width$}", index, width = self.width)
        };
        format!("{}{}{}", self.prefix, number, self.suffix)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for NameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
