//! Output path selectors
//!
//! A path picks one value out of a node's realized outputs. Both bracket and
//! dot notation are accepted for list indices: `statuses[0].url` and
//! `statuses.0.url` select the same value.

use super::error::GraphError;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Parsed output selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPath {
    segments: Vec<Segment>,
}

impl OutputPath {
    pub fn parse(raw: &str) -> Result<Self, GraphError> {
        let invalid = || GraphError::InvalidPath(raw.to_string());
        if raw.is_empty() {
            return Err(invalid());
        }

        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err(invalid());
            }

            let (head, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };

            if head.contains(']') {
                return Err(invalid());
            }

            if !head.is_empty() {
                // Bare numeric segments index into lists
                match head.parse::<usize>() {
                    Ok(idx) => segments.push(Segment::Index(idx)),
                    Err(_) => segments.push(Segment::Key(head.to_string())),
                }
            } else if rest.is_empty() {
                return Err(invalid());
            }

            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(invalid)?;
                if !rest.starts_with('[') {
                    return Err(invalid());
                }
                let idx = rest[1..close].parse::<usize>().map_err(|_| invalid())?;
                segments.push(Segment::Index(idx));
                rest = &rest[close + 1..];
            }
        }

        Ok(Self { segments })
    }

    /// Top-level output attribute this path starts from
    pub fn root(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(k)) => Some(k),
            _ => None,
        }
    }

    /// Select the value at this path, if present
    pub fn lookup<'a>(&self, outputs: &'a Value) -> Option<&'a Value> {
        let mut current = outputs;
        for segment in &self.segments {
            current = match segment {
                Segment::Key(key) => current.get(key.as_str())?,
                Segment::Index(idx) => current.get(*idx)?,
            };
        }
        Some(current)
    }
}

impl fmt::Display for OutputPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}
