//! EOL-Heuristic: discovers a subset `E ⊆ Σ` of "end-of-lexeme" filler symbols
//! whose removal from any positive word preserves membership, then suppresses
//! further prefix extensions through `E` while the suppression flag is active.

use std::collections::HashSet;

use indexmap::IndexSet;
use itertools::Itertools;
use tracing::{info, instrument};

use crate::error::LearnerError;
use crate::table::ObservationTable;
use crate::teacher::TeacherAdapter;
use crate::word::Word;

/// Deletes every occurrence of any symbol in `alphabet` from `word`.
fn remove_letters(word: &str, alphabet: &HashSet<char>) -> String {
    word.chars().filter(|c| !alphabet.contains(c)).collect()
}

#[derive(Debug)]
pub struct EolHeuristic {
    threshold: usize,
    fired: bool,
    eol_alphabet: Option<IndexSet<char>>,
    suppression_active: bool,
}

impl EolHeuristic {
    pub fn new(threshold: usize) -> Self {
        EolHeuristic { threshold, fired: false, eol_alphabet: None, suppression_active: false }
    }

    pub fn is_suppressed(&self, symbol: char) -> bool {
        self.suppression_active && self.eol_alphabet.as_ref().is_some_and(|e| e.contains(&symbol))
    }

    /// Whether the heuristic has already run once this session.
    pub fn fired(&self) -> bool {
        self.fired
    }

    /// Whether `symbol` is part of the accepted EOL alphabet, regardless of
    /// whether suppression is currently active.
    pub fn eol_contains(&self, symbol: char) -> bool {
        self.eol_alphabet.as_ref().is_some_and(|e| e.contains(&symbol))
    }

    /// Disables suppression if `word` contains any currently-known EOL
    /// symbol (the counterexample falsified the heuristic for that symbol
    /// this round); otherwise re-enables it.
    pub fn on_counterexample(&mut self, word: &Word) {
        let contains_eol = match (&self.eol_alphabet, word) {
            (Some(eol), Word::Symbols(s)) => s.chars().any(|c| eol.contains(&c)),
            _ => false,
        };
        self.suppression_active = !contains_eol;
    }

    /// Runs the heuristic at most once per session, the first time the
    /// cache's positive-word count crosses `threshold`.
    #[instrument(
        skip(self, table, teacher),
        fields(threshold = self.threshold, table_size = table.all_prefixes().len(), cache_size = table.cache_len())
    )]
    pub fn maybe_trigger(&mut self, table: &mut ObservationTable, teacher: &mut dyn TeacherAdapter) -> Result<(), LearnerError> {
        if self.fired || table.positive_count() <= self.threshold {
            return Ok(());
        }
        self.fired = true;

        let positives = table.positive_words();
        let alphabet = table.alphabet().to_vec();
        if alphabet.len() < 2 {
            return Ok(());
        }

        // Subsets of Σ of decreasing cardinality, starting at |Σ|-1 (skipping
        // the full alphabet) down to singletons.
        for size in (1..alphabet.len()).rev() {
            for candidate in alphabet.iter().copied().combinations(size) {
                let candidate_set: HashSet<char> = candidate.iter().copied().collect();

                let reduced: Vec<String> = positives.iter().map(|w| remove_letters(w, &candidate_set)).collect();
                if reduced.iter().any(|w| w.is_empty()) {
                    continue;
                }

                let words: Vec<Word> = reduced.iter().map(|s| Word::from_symbols(s.clone())).collect();
                let missing: Vec<Word> = words.iter().filter(|w| !table.contains_word(w.cache_key())).cloned().collect();
                if !missing.is_empty() {
                    let verdicts = teacher.membership_batch(&missing);
                    if verdicts.len() != missing.len() {
                        return Err(LearnerError::Protocol(format!(
                            "membership_batch returned {} verdicts for {} words",
                            verdicts.len(),
                            missing.len()
                        )));
                    }
                    for (word, verdict) in missing.iter().zip(verdicts) {
                        match verdict.as_bool() {
                            Some(belongs) => {
                                table.add_word(word.cache_key().to_string(), belongs)?;
                            }
                            None => return Err(LearnerError::Transport(format!("membership query for {word} returned Unknown"))),
                        }
                    }
                }

                let all_positive = words.iter().all(|w| table.word_belongs(w.cache_key()).unwrap_or(false));
                if all_positive {
                    let accepted: IndexSet<char> = candidate_set.into_iter().collect();
                    self.eol_alphabet = Some(match self.eol_alphabet.take() {
                        Some(existing) => existing.intersection(&accepted).copied().collect(),
                        None => accepted,
                    });
                    self.suppression_active = true;
                    info!(eol_alphabet = ?self.eol_alphabet, "EOL heuristic accepted a candidate alphabet");
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
