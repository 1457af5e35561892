//! Ordering of reviewer names.
//!
//! Reviewer folders are named after people. Their documents are merged in
//! order of the pinyin initial of the first Han character, which matches the
//! order on the signed evaluation forms.

use std::cmp::Ordering;

/// Key used for names without a Han character or a known initial. Sorts
/// after `Z`.
const UNKNOWN_INITIAL: char = '{';

/// How to order names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Collation {
    /// By the uppercase pinyin initial of the first Han character, then by
    /// the full name.
    #[default]
    Pinyin,
    /// By code point.
    Lexicographic,
}
impl Collation {
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Pinyin => (pinyin_initial(a), a).cmp(&(pinyin_initial(b), b)),
            Self::Lexicographic => a.cmp(b),
        }
    }
}

/// Whether `c` is in the CJK Unified Ideographs block.
pub fn is_han(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

pub fn first_han(name: &str) -> Option<char> {
    name.chars().find(|&c| is_han(c))
}

/// Uppercase pinyin initial of the first Han character in `name`.
pub fn pinyin_initial(name: &str) -> char {
    first_han(name).and_then(initial_of).unwrap_or(UNKNOWN_INITIAL)
}

#[cfg(feature = "pinyin")]
fn initial_of(c: char) -> Option<char> {
    use pinyin::ToPinyin;
    let initial = c.to_pinyin()?.first_letter().chars().next()?.to_ascii_uppercase();
    initial.is_ascii_uppercase().then_some(initial)
}

#[cfg(not(feature = "pinyin"))]
fn initial_of(_c: char) -> Option<char> {
    None
}

/// Stable sort of arbitrary items by a name extracted from each.
pub fn sort_by_name<T>(items: &mut [T], collation: Collation, name: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| collation.compare(name(a), name(b)));
}

/// Sort names, returning a new vector.
pub fn sort_names<S: AsRef<str>>(names: impl IntoIterator<Item = S>, collation: Collation) -> Vec<S> {
    let mut names: Vec<S> = names.into_iter().collect();
    sort_by_name(&mut names, collation, |n| n.as_ref());
    names
}
