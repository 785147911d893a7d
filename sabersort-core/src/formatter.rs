//! Output file naming from candidate metadata.
//!
//! Templates use `{key}` placeholders:
//!
//! | key         | value                               |
//! |-------------|-------------------------------------|
//! | `origin`    | origin site (`pixiv`, `twitter`, …) |
//! | `author`    | author display name                 |
//! | `author_id` | author id on the origin             |
//! | `title`     | post title                          |
//! | `id`        | post id                             |
//! | `index`     | page index within the post          |
//!
//! `{{` and `}}` produce literal braces. Unknown keys, and `index` when no
//! page was selected, render as the empty string.

use std::path::PathBuf;

use crate::candidate::Candidate;
use crate::error::{Result, SaberError};

/// Default output name: origin, author id and post id.
pub const DEFAULT_TEMPLATE: &str = "{origin}-{author_id}-{id}";

const FALLBACK_STEM: &str = "untitled";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Values substituted into a [`FilenameFormat`].
#[derive(Debug, Clone, Copy)]
pub struct FilenameFields<'a> {
    pub origin: &'a str,
    pub author: &'a str,
    pub author_id: &'a str,
    pub title: &'a str,
    pub id: &'a str,
    pub index: Option<usize>,
}

impl<'a> FilenameFields<'a> {
    pub fn from_candidate(candidate: &'a Candidate, index: Option<usize>) -> Self {
        Self {
            origin: candidate.origin.as_str(),
            author: &candidate.author,
            author_id: &candidate.author_id,
            title: &candidate.title,
            id: &candidate.id,
            index,
        }
    }

    fn value(&self, key: &str) -> String {
        match key {
            "origin" => self.origin.to_string(),
            "author" => self.author.to_string(),
            "author_id" => self.author_id.to_string(),
            "title" => self.title.to_string(),
            "id" => self.id.to_string(),
            "index" => self.index.map(|i| i.to_string()).unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// A parsed file name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameFormat {
    segments: Vec<Segment>,
}

impl Default for FilenameFormat {
    fn default() -> Self {
        Self {
            segments: vec![
                Segment::Field("origin".into()),
                Segment::Literal("-".into()),
                Segment::Field("author_id".into()),
                Segment::Literal("-".into()),
                Segment::Field("id".into()),
            ],
        }
    }
}

impl FilenameFormat {
    /// Parse a template. Only unbalanced braces are rejected.
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut key = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => {
                                return Err(SaberError::Config(format!(
                                    "Unclosed placeholder in file name template: {template}"
                                )))
                            }
                            Some(k) => key.push(k),
                        }
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(key.trim().to_string()));
                }
                '}' => {
                    return Err(SaberError::Config(format!(
                        "Single '}}' in file name template: {template}"
                    )))
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Render the template and append `.extension`.
    ///
    /// Substituted values have path separators and other characters that are
    /// illegal in file names replaced with `_`; literal template text is kept.
    pub fn render(&self, fields: &FilenameFields<'_>, extension: &str) -> PathBuf {
        let mut stem = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => stem.push_str(text),
                Segment::Field(key) => stem.push_str(&sanitize(&fields.value(key))),
            }
        }
        if stem.trim().is_empty() {
            stem = FALLBACK_STEM.to_string();
        }

        let extension = extension.trim_start_matches('.');
        if extension.is_empty() {
            PathBuf::from(stem)
        } else {
            PathBuf::from(format!("{stem}.{extension}"))
        }
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
