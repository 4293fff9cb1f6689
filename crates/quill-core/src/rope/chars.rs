//! Text helpers for `Rope<char>`.
//!
//! All positions are char indices, matching the rope's element indices.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use super::{Rope, RopeError, node};

impl Rope<char> {
    /// Returns `count` chars starting at `index` as a `String`.
    pub fn substring(&self, index: usize, count: usize) -> Result<String, RopeError> {
        self.verify_range(index, count)?;
        let mut out = String::with_capacity(count);
        node::visit(&self.root, index, count, &mut |chars: &[char]| out.extend(chars));
        Ok(out)
    }

    /// Inserts `text` at char index `index`.
    pub fn insert_str(&mut self, index: usize, text: &str) -> Result<(), RopeError> {
        let chars: Vec<char> = text.chars().collect();
        self.insert_slice(index, &chars)
    }

    /// Appends `text`.
    pub fn push_str(&mut self, text: &str) {
        let chars: Vec<char> = text.chars().collect();
        self.extend_from_slice(&chars);
    }

    /// Index of the first char within `[start, start + count)` that is one of `any`.
    pub fn index_of_any(
        &self,
        any: &[char],
        start: usize,
        count: usize,
    ) -> Result<Option<usize>, RopeError> {
        self.verify_range(start, count)?;
        let mut position = start;
        let mut found = None;
        node::visit(&self.root, start, count, &mut |chars: &[char]| {
            if found.is_some() {
                return;
            }
            match chars.iter().position(|c| any.contains(c)) {
                Some(offset) => found = Some(position + offset),
                None => position += chars.len(),
            }
        });
        Ok(found)
    }

    /// Index of the first occurrence of `needle` that lies entirely within
    /// `[start, start + count)`. An empty needle matches at `start`.
    pub fn find_str(&self, needle: &str, start: usize, count: usize) -> Result<Option<usize>, RopeError> {
        let haystack = self.substring(start, count)?;
        Ok(haystack
            .find(needle)
            .map(|byte| start + haystack[..byte].chars().count()))
    }

    /// Index of the last occurrence of `needle` that lies entirely within
    /// `[start, start + count)`. An empty needle matches at `start + count`.
    pub fn rfind_str(&self, needle: &str, start: usize, count: usize) -> Result<Option<usize>, RopeError> {
        let haystack = self.substring(start, count)?;
        Ok(haystack
            .rfind(needle)
            .map(|byte| start + haystack[..byte].chars().count()))
    }

    /// Writes the whole rope to `out`.
    pub fn write_to<W: fmt::Write + ?Sized>(&self, out: &mut W) -> fmt::Result {
        let mut result = Ok(());
        let mut buffer = String::new();
        node::visit(&self.root, 0, self.len(), &mut |chars: &[char]| {
            if result.is_err() {
                return;
            }
            buffer.clear();
            buffer.extend(chars);
            result = out.write_str(&buffer);
        });
        result
    }
}

impl From<&str> for Rope<char> {
    fn from(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        Self::from_slice(&chars)
    }
}

impl FromStr for Rope<char> {
    type Err = Infallible;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(text))
    }
}

impl fmt::Display for Rope<char> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_to(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_multibyte() {
        let rope = Rope::from("héllo 世界!");
        assert_eq!(rope.len(), 9);
        assert_eq!(rope.substring(1, 4).unwrap(), "éllo");
        assert_eq!(rope.substring(6, 2).unwrap(), "世界");
        assert!(rope.substring(8, 2).is_err());
    }

    #[test]
    fn test_find_str_reports_char_index() {
        let rope = Rope::from("αβγ abc αβγ abc");
        assert_eq!(rope.find_str("abc", 0, rope.len()), Ok(Some(4)));
        assert_eq!(rope.find_str("abc", 5, 10), Ok(Some(12)));
        assert_eq!(rope.rfind_str("αβγ", 0, rope.len()), Ok(Some(8)));
        assert_eq!(rope.find_str("", 3, 2), Ok(Some(3)));
        assert_eq!(rope.rfind_str("", 3, 2), Ok(Some(5)));
        assert_eq!(rope.find_str("zzz", 0, rope.len()), Ok(None));
    }

    #[test]
    fn test_index_of_any_across_leaves() {
        let mut text = "a".repeat(700);
        text.push('\n');
        text.push_str(&"b".repeat(100));
        let rope: Rope<char> = text.parse().unwrap();
        assert_eq!(rope.index_of_any(&['\r', '\n'], 0, rope.len()), Ok(Some(700)));
        assert_eq!(rope.index_of_any(&['\r', '\n'], 701, 100), Ok(None));
    }

    #[test]
    fn test_display_round_trips_large_text() {
        let text: String = (0..5_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let mut rope = Rope::from(text.as_str());
        rope.push_str("!");
        assert_eq!(rope.to_string(), format!("{text}!"));
    }
}
