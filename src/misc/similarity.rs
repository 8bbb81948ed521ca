//! Fuzzy string matching, used to pick audio devices by a partial name.

use hashbrown::HashMap;

pub trait Similarity {
    fn similarity(&self, other: &Self) -> f64;
}

impl<T: AsRef<str>> Similarity for T {
    fn similarity(&self, other: &Self) -> f64 {
        similarity(self.as_ref(), other.as_ref())
    }
}

/// Dice coefficient over character bigrams, ignoring spaces and case.
/// 1.0 means identical, 0.0 means nothing in common.
pub fn similarity(str1: &str, str2: &str) -> f64 {
    let a = str1.replace(' ', "").to_lowercase().chars().collect::<Vec<_>>();
    let b = str2.replace(' ', "").to_lowercase().chars().collect::<Vec<_>>();

    // Check some simple cases
    if a == b {
        return 1.0;
    }

    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }

    let mut first_bigrams = HashMap::<(char, char), i32>::new();
    for bigram in a.windows(2) {
        *first_bigrams.entry((bigram[0], bigram[1])).or_insert(0) += 1;
    }

    let mut intersection_size = 0;
    for bigram in b.windows(2) {
        if let Some(count) = first_bigrams.get_mut(&(bigram[0], bigram[1])) {
            if *count > 0 {
                *count -= 1;
                intersection_size += 1;
            }
        }
    }

    (2.0 * intersection_size as f64) / (a.len() + b.len() - 2) as f64
}
