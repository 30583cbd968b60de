//! Observation Table (ET): rows indexed by prefixes (main or extension),
//! columns indexed by suffixes, cells holding a ternary value. Owns the
//! Membership Cache exclusively.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tracing::instrument;

use crate::cache::MembershipCache;
use crate::cell::Cell;
use crate::error::LearnerError;
use crate::teacher::{TableView, TeacherAdapter};
use crate::word::Word;

#[derive(Debug)]
pub struct ObservationTable {
    alphabet: Vec<char>,
    /// Insertion-ordered for determinism; `bool` is the `is_main` flag.
    prefixes: IndexMap<Word, bool>,
    suffixes: IndexSet<Word>,
    cells: HashMap<(Word, Word), Cell>,
    cache: MembershipCache,
}

impl ObservationTable {
    /// Creates a table with the `{ε}` main prefix, `{ε}` suffix, empty cells
    /// and an empty cache.
    pub fn new(alphabet: Vec<char>) -> Self {
        let mut table = ObservationTable {
            alphabet,
            prefixes: IndexMap::new(),
            suffixes: IndexSet::new(),
            cells: HashMap::new(),
            cache: MembershipCache::new(),
        };
        table.add_suffix(Word::epsilon());
        table.add_prefix(Word::epsilon(), true);
        table
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    pub fn suffixes(&self) -> impl Iterator<Item = &Word> {
        self.suffixes.iter()
    }

    pub fn main_prefixes(&self) -> Vec<Word> {
        self.prefixes.iter().filter(|(_, &m)| m).map(|(w, _)| w.clone()).collect()
    }

    pub fn extension_prefixes(&self) -> Vec<Word> {
        self.prefixes.iter().filter(|(_, &m)| !m).map(|(w, _)| w.clone()).collect()
    }

    pub fn all_prefixes(&self) -> Vec<Word> {
        self.prefixes.keys().cloned().collect()
    }

    /// Idempotent. Returns `false` iff a prefix with this value already
    /// existed (regardless of its `is_main`).
    pub fn add_prefix(&mut self, value: Word, is_main: bool) -> bool {
        if self.prefixes.contains_key(&value) {
            return false;
        }
        self.prefixes.insert(value.clone(), is_main);
        for suffix in self.suffixes.iter() {
            self.cells.entry((value.clone(), suffix.clone())).or_insert(Cell::Unfilled);
        }
        true
    }

    /// Idempotent.
    pub fn add_suffix(&mut self, value: Word) -> bool {
        if self.suffixes.contains(&value) {
            return false;
        }
        self.suffixes.insert(value.clone());
        for prefix in self.prefixes.keys().cloned().collect::<Vec<_>>() {
            self.cells.entry((prefix, value.clone())).or_insert(Cell::Unfilled);
        }
        true
    }

    pub fn get(&self, prefix: &Word, suffix: &Word) -> Cell {
        self.cells.get(&(prefix.clone(), suffix.clone())).copied().unwrap_or(Cell::Unfilled)
    }

    /// Writes the cell and publishes to the membership cache under the
    /// canonicalized word. A no-op if the cell already holds this value; an
    /// `InvariantViolation` if it holds a conflicting one, whether via this
    /// exact cell or via another `(p', s')` pair that canonicalizes to the
    /// same word (enforced by the cache, not by geometry).
    pub fn set(&mut self, prefix: &Word, suffix: &Word, belongs: bool) -> Result<(), LearnerError> {
        let word = prefix.concat(suffix);
        self.cache.insert(word.cache_key().to_string(), belongs)?;

        let key = (prefix.clone(), suffix.clone());
        match self.cells.get(&key).copied().unwrap_or(Cell::Unfilled) {
            Cell::Unfilled => {
                self.cells.insert(key, Cell::from_bool(belongs));
            }
            existing if existing.as_bool() == Some(belongs) => {}
            _ => {
                return Err(LearnerError::InvariantViolation(format!(
                    "cell ({prefix}, {suffix}) already holds a conflicting value"
                )));
            }
        }
        Ok(())
    }

    pub fn contains_word(&self, word: &str) -> bool {
        self.cache.contains(word)
    }

    pub fn word_belongs(&self, word: &str) -> Result<bool, LearnerError> {
        self.cache
            .get(word)
            .ok_or_else(|| LearnerError::InvariantViolation(format!("word {word:?} read before it was filled")))
    }

    pub fn add_word(&mut self, word: impl Into<String>, belongs: bool) -> Result<bool, LearnerError> {
        self.cache.insert(word, belongs)
    }

    pub fn positive_count(&self) -> usize {
        self.cache.positive_count()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn positive_words(&self) -> Vec<String> {
        self.cache.positive_words().map(str::to_string).collect()
    }

    pub fn rows_equal(&self, p1: &Word, p2: &Word) -> bool {
        self.suffixes.iter().all(|s| self.get(p1, s) == self.get(p2, s))
    }

    pub fn all_prefixes_main(&self) -> bool {
        self.prefixes.values().all(|&is_main| is_main)
    }

    /// Every unfilled `(prefix, suffix)` pair, in prefix-then-suffix
    /// insertion order.
    pub fn unfilled_cells(&self) -> Vec<(Word, Word)> {
        let mut result = Vec::new();
        for prefix in self.prefixes.keys() {
            for suffix in self.suffixes.iter() {
                if !self.get(prefix, suffix).is_filled() {
                    result.push((prefix.clone(), suffix.clone()));
                }
            }
        }
        result
    }

    /// Promotes every extension prefix with no main-prefix row match to main.
    /// A prefix promoted earlier in this call is eligible as a match target
    /// for prefixes considered later in the same call. Returns the number of
    /// promotions.
    #[instrument(skip(self), fields(table_size = self.prefixes.len(), cache_size = self.cache.len()))]
    pub fn close(&mut self) -> usize {
        let extensions = self.extension_prefixes();
        let mut promoted = 0;
        for ext in extensions {
            let has_match = self
                .prefixes
                .iter()
                .filter(|(_, &is_main)| is_main)
                .any(|(m, _)| self.rows_equal(&ext, m));
            if !has_match {
                if let Some(flag) = self.prefixes.get_mut(&ext) {
                    *flag = true;
                    promoted += 1;
                }
            }
        }
        promoted
    }

    /// Ensures every word in `words` has a cached membership value, filling
    /// any gaps with a single batched Teacher call. Surfaces a transport
    /// failure as `LearnerError::Transport` so the Learner Loop's retry
    /// wrapper can retry the whole operation.
    fn ensure_words_filled(&mut self, words: &[Word], teacher: &mut dyn TeacherAdapter) -> Result<(), LearnerError> {
        let missing: Vec<Word> = words.iter().filter(|w| !self.cache_contains(w)).cloned().collect();
        if missing.is_empty() {
            return Ok(());
        }
        let verdicts = teacher.membership_batch(&missing);
        if verdicts.len() != missing.len() {
            return Err(LearnerError::Protocol(format!(
                "membership_batch returned {} verdicts for {} words",
                verdicts.len(),
                missing.len()
            )));
        }
        for (word, verdict) in missing.iter().zip(verdicts) {
            let belongs = verdict
                .as_bool()
                .ok_or_else(|| LearnerError::Transport(format!("membership query for {word} returned Unknown")))?;
            self.cache.insert(word.cache_key().to_string(), belongs)?;
        }
        Ok(())
    }

    fn cache_contains(&self, word: &Word) -> bool {
        self.cache.contains(word.cache_key())
    }

    /// Finds the first distinguishing one-symbol-plus-suffix extension for
    /// any pair of equal-row main prefixes, in a fixed deterministic order:
    /// prefix pairs `(i<j)` in insertion order, then suffixes in insertion
    /// order, then alphabet in Σ-order. This keeps bug reports against a
    /// given Teacher reproducible. Fills any membership values it needs via
    /// `teacher` before comparing — never consulting only the cache.
    pub fn resolve_inconsistency(&mut self, teacher: &mut dyn TeacherAdapter) -> Result<bool, LearnerError> {
        let mains = self.main_prefixes();
        let suffixes: Vec<Word> = self.suffixes.iter().cloned().collect();
        let alphabet = self.alphabet.clone();

        for i in 0..mains.len() {
            for j in (i + 1)..mains.len() {
                let (p1, p2) = (&mains[i], &mains[j]);
                if !self.rows_equal(p1, p2) {
                    continue;
                }
                for v in &suffixes {
                    for &a in &alphabet {
                        let av = Word::from_symbols(a.to_string()).concat(v);
                        let w1 = p1.concat(&av);
                        let w2 = p2.concat(&av);
                        self.ensure_words_filled(&[w1.clone(), w2.clone()], teacher)?;
                        let b1 = self.cache.get(w1.cache_key()).expect("just filled");
                        let b2 = self.cache.get(w2.cache_key()).expect("just filled");
                        if b1 != b2 {
                            self.add_suffix(av);
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    /// The data the Teacher consumes for an equivalence query: main prefixes,
    /// then extension prefixes, then suffixes, with `ε` kept explicit.
    /// Panics if any cell in scope is unfilled — by this point every cell
    /// must have been filled by the Fill phase.
    pub fn snapshot_for_equivalence(&self) -> TableView {
        let main_prefixes = self.main_prefixes();
        let extension_prefixes = self.extension_prefixes();
        let suffixes: Vec<Word> = self.suffixes.iter().cloned().collect();

        let mut matrix = Vec::with_capacity(main_prefixes.len() + extension_prefixes.len());
        for prefix in main_prefixes.iter().chain(extension_prefixes.iter()) {
            let row: Vec<bool> = suffixes
                .iter()
                .map(|s| {
                    self.get(prefix, s)
                        .as_bool()
                        .expect("table must be fully filled before a conjecture is submitted")
                })
                .collect();
            matrix.push(row);
        }

        TableView { main_prefixes, extension_prefixes, suffixes, matrix }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teacher::Verdict;

    struct StubTeacher {
        answers: HashMap<String, bool>,
    }

    impl TeacherAdapter for StubTeacher {
        fn membership_batch(&mut self, words: &[Word]) -> Vec<Verdict> {
            words
                .iter()
                .map(|w| match self.answers.get(w.cache_key()) {
                    Some(&true) => Verdict::In,
                    Some(&false) => Verdict::Out,
                    None => Verdict::Out,
                })
                .collect()
        }

        fn equivalence(&mut self, _view: &TableView) -> crate::teacher::EqVerdict {
            unreachable!("not exercised in these unit tests")
        }

        fn configure_mode(&mut self, _mode: crate::teacher::MatMode) -> Result<crate::teacher::ModeParams, LearnerError> {
            Ok(crate::teacher::ModeParams::default())
        }
    }

    #[test]
    fn new_table_has_epsilon_prefix_and_suffix() {
        let table = ObservationTable::new(vec!['a', 'b']);
        assert_eq!(table.main_prefixes(), vec![Word::epsilon()]);
        assert_eq!(table.suffixes().collect::<Vec<_>>(), vec![&Word::epsilon()]);
        assert_eq!(table.get(&Word::epsilon(), &Word::epsilon()), Cell::Unfilled);
    }

    #[test]
    fn add_prefix_is_idempotent() {
        let mut table = ObservationTable::new(vec!['a']);
        assert!(table.add_prefix(Word::from_symbols("a"), false));
        assert!(!table.add_prefix(Word::from_symbols("a"), true));
    }

    #[test]
    fn add_suffix_is_idempotent() {
        let mut table = ObservationTable::new(vec!['a']);
        assert!(table.add_suffix(Word::from_symbols("a")));
        assert!(!table.add_suffix(Word::from_symbols("a")));
    }

    #[test]
    fn set_is_a_noop_when_value_matches() {
        let mut table = ObservationTable::new(vec!['a']);
        table.set(&Word::epsilon(), &Word::epsilon(), true).unwrap();
        table.set(&Word::epsilon(), &Word::epsilon(), true).unwrap();
        assert_eq!(table.get(&Word::epsilon(), &Word::epsilon()).as_bool(), Some(true));
    }

    #[test]
    fn set_rejects_conflicting_value() {
        let mut table = ObservationTable::new(vec!['a']);
        table.set(&Word::epsilon(), &Word::epsilon(), true).unwrap();
        let err = table.set(&Word::epsilon(), &Word::epsilon(), false).unwrap_err();
        assert!(matches!(err, LearnerError::InvariantViolation(_)));
    }

    #[test]
    fn distinct_decompositions_of_same_word_share_a_cache_value() {
        let mut table = ObservationTable::new(vec!['a', 'b', 'c']);
        table.add_prefix(Word::from_symbols("a"), true);
        table.add_suffix(Word::from_symbols("bc"));
        table.add_suffix(Word::from_symbols("c"));
        table.add_prefix(Word::from_symbols("ab"), false);

        // (a, bc) and (ab, c) both denote the word "abc".
        table.set(&Word::from_symbols("a"), &Word::from_symbols("bc"), true).unwrap();
        let err = table.set(&Word::from_symbols("ab"), &Word::from_symbols("c"), false).unwrap_err();
        assert!(matches!(err, LearnerError::InvariantViolation(_)));
    }

    #[test]
    fn close_promotes_extension_rows_with_no_main_match() {
        let mut table = ObservationTable::new(vec!['a', 'b']);
        table.add_prefix(Word::from_symbols("a"), false);
        table.add_prefix(Word::from_symbols("b"), false);
        table.set(&Word::epsilon(), &Word::epsilon(), false).unwrap();
        table.set(&Word::from_symbols("a"), &Word::epsilon(), true).unwrap();
        table.set(&Word::from_symbols("b"), &Word::epsilon(), false).unwrap();

        let promoted = table.close();
        assert_eq!(promoted, 1);
        assert!(table.main_prefixes().contains(&Word::from_symbols("a")));
        assert!(!table.main_prefixes().contains(&Word::from_symbols("b")));
    }

    #[test]
    fn resolve_inconsistency_fills_missing_values_via_teacher() {
        let mut table = ObservationTable::new(vec!['a', 'b']);
        table.add_prefix(Word::from_symbols("b"), true);
        // ε and "b" have equal (both false) rows over the only suffix, ε.
        table.set(&Word::epsilon(), &Word::epsilon(), false).unwrap();
        table.set(&Word::from_symbols("b"), &Word::epsilon(), false).unwrap();

        // Neither "a" (= ε·a·ε) nor "ba" (= b·a·ε) is cached yet; the teacher
        // disagrees on them, so "a" becomes the distinguishing new suffix.
        let mut teacher = StubTeacher { answers: HashMap::from([("a".to_string(), true)]) };
        let changed = table.resolve_inconsistency(&mut teacher).unwrap();
        assert!(changed);
        assert!(table.suffixes().any(|s| s == &Word::from_symbols("a")));
    }
}
