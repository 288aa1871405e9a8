use anyhow::{anyhow, Result};

/// Ordered, immutable set of case-insensitive trigger words.
///
/// Construction rejects an empty list and blank entries: a blank needle would
/// match every caption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerSet {
    words: Vec<String>,
    needles: Vec<String>,
}

impl TriggerSet {
    pub fn new<I, S>(words: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self {
            words: Vec::new(),
            needles: Vec::new(),
        };
        for word in words {
            let word = word.as_ref().trim();
            if word.is_empty() {
                return Err(anyhow!("trigger words must not be blank"));
            }
            let needle = word.to_lowercase();
            if set.needles.contains(&needle) {
                continue;
            }
            set.words.push(word.to_string());
            set.needles.push(needle);
        }
        if set.words.is_empty() {
            return Err(anyhow!("at least one trigger word is required"));
        }
        Ok(set)
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Trigger words occurring as case-insensitive substrings of `caption`,
    /// in configured order.
    pub fn matches_in(&self, caption: &str) -> Vec<String> {
        let haystack = caption.to_lowercase();
        self.words
            .iter()
            .zip(&self.needles)
            .filter(|(_, needle)| haystack.contains(needle.as_str()))
            .map(|(word, _)| word.clone())
            .collect()
    }
}
