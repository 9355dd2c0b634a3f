//! Key sources: where the domains to check come from.
//!
//! A [`KeySource`] is a finite, forward-only iterator of lower-cased domain
//! names read from the argument list, a file or standard input. It is consumed
//! exactly once by the submission loop.

use crate::config::SourceConfig;
use anyhow::Context;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
};

pub enum KeySource {
    Args(std::vec::IntoIter<String>),
    Reader(io::Lines<Box<dyn BufRead + Send>>),
}

impl KeySource {
    pub fn open(config: &SourceConfig) -> anyhow::Result<Self> {
        Ok(match config {
            SourceConfig::Args(domains) => Self::from_args(domains.clone()),
            SourceConfig::Stdin => Self::from_reader(BufReader::new(io::stdin())),
            SourceConfig::File(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Error during opening the file {}", path.display()))?;
                Self::from_reader(BufReader::new(file))
            }
        })
    }

    pub fn from_args(domains: Vec<String>) -> Self {
        Self::Args(domains.into_iter())
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        let reader: Box<dyn BufRead + Send> = Box::new(reader);
        Self::Reader(reader.lines())
    }
}

impl Iterator for KeySource {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match self {
            Self::Args(domains) => domains.next().map(|d| d.to_lowercase()),
            Self::Reader(lines) => loop {
                match lines.next()? {
                    Ok(line) => {
                        let domain = line.trim();
                        if !domain.is_empty() {
                            return Some(domain.to_lowercase());
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Stopped reading domains: {e}");
                        return None;
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(input: &'static str) -> Vec<String> {
        KeySource::from_reader(Cursor::new(input)).collect()
    }

    #[test]
    fn args_are_lower_cased() {
        let keys: Vec<_> = KeySource::from_args(vec!["A.com".into(), "b.COM".into()]).collect();
        assert_eq!(keys, ["a.com", "b.com"]);
    }

    #[test]
    fn lines_are_trimmed_and_lower_cased() {
        assert_eq!(
            collect("  Example.COM \r\nfoo.org\n"),
            ["example.com", "foo.org"]
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(collect("a.com\n\n   \nb.com\n"), ["a.com", "b.com"]);
    }

    #[test]
    fn last_line_without_newline_is_kept() {
        assert_eq!(collect("a.com\nb.com"), ["a.com", "b.com"]);
    }

    #[test]
    fn duplicates_are_preserved() {
        assert_eq!(collect("a.com\nA.com\n"), ["a.com", "a.com"]);
    }

    #[test]
    fn invalid_utf8_ends_the_sequence() {
        let keys: Vec<_> =
            KeySource::from_reader(Cursor::new(b"a.com\n\xff\xfe\nb.com\n".to_vec())).collect();
        assert_eq!(keys, ["a.com"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let res = KeySource::open(&SourceConfig::File("/definitely/not/here.txt".into()));
        assert!(res.is_err());
    }
}
