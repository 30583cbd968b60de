//! Learner Loop: orchestrates table filling, extension, closure, consistency
//! resolution, conjecture submission, counterexample integration, and
//! heuristic invocation, until the Teacher accepts a hypothesis.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{info, instrument, warn};

use crate::error::LearnerError;
use crate::heuristic::EolHeuristic;
use crate::table::ObservationTable;
use crate::teacher::{EqVerdict, TeacherAdapter, Verdict};
use crate::word::Word;

/// The EOL-Heuristic fires once the cache holds more positive words than this
/// (reference default: 5000). Exposed as a constructor parameter so tests and
/// small demo sessions can use a far smaller threshold.
pub const DEFAULT_EOL_THRESHOLD: usize = 5000;

/// Retry/backoff policy wrapped around every Teacher call: a bounded number of
/// attempts, exponential backoff with jitter.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_attempts: 5, base_delay: Duration::from_millis(200), max_delay: Duration::from_secs(10) }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: usize) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) as u64 / 4 + 1);
        capped + Duration::from_millis(jitter_ms)
    }
}

pub struct Learner {
    table: ObservationTable,
    teacher: Box<dyn TeacherAdapter>,
    heuristic: EolHeuristic,
    retry: RetryPolicy,
    round: usize,
    should_continue: Box<dyn FnMut() -> bool>,
}

impl Learner {
    pub fn new(alphabet: Vec<char>, teacher: Box<dyn TeacherAdapter>) -> Self {
        Learner::with_eol_threshold(alphabet, teacher, DEFAULT_EOL_THRESHOLD)
    }

    pub fn with_eol_threshold(alphabet: Vec<char>, teacher: Box<dyn TeacherAdapter>, eol_threshold: usize) -> Self {
        Learner {
            table: ObservationTable::new(alphabet),
            teacher,
            heuristic: EolHeuristic::new(eol_threshold),
            retry: RetryPolicy::default(),
            round: 0,
            should_continue: Box::new(|| true),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Installs a cancellation predicate checked at every phase boundary and
    /// at the return of every Teacher call. The default always continues.
    /// Returning `false` stops the loop with `LearnerError::Cancelled`; the
    /// table is always in a consistent, resumable state at that point.
    pub fn with_should_continue(mut self, should_continue: impl FnMut() -> bool + 'static) -> Self {
        self.should_continue = Box::new(should_continue);
        self
    }

    fn check_should_continue(&mut self) -> Result<(), LearnerError> {
        if (self.should_continue)() {
            Ok(())
        } else {
            Err(LearnerError::Cancelled)
        }
    }

    pub fn table(&self) -> &ObservationTable {
        &self.table
    }

    pub fn heuristic(&self) -> &EolHeuristic {
        &self.heuristic
    }

    /// Runs the loop to completion, returning `Ok(())` once the Teacher
    /// accepts the conjecture. Surfaces `ProtocolError`, `InvariantViolation`
    /// and exhausted `TransportError`s to the caller; the table is left in a
    /// consistent, resumable state at the most recent phase boundary.
    pub fn learn(&mut self) -> Result<(), LearnerError> {
        loop {
            self.round += 1;
            self.check_should_continue()?;

            loop {
                self.fill_phase()?;
                self.check_should_continue()?;
                let extended = self.extension_phase()?;
                self.check_should_continue()?;
                if extended {
                    self.fill_phase()?;
                    self.check_should_continue()?;
                }
                let promoted = self.close_phase();
                self.check_should_continue()?;
                if promoted == 0 {
                    break;
                }
                info!(promoted, "closure promoted extension prefixes, re-extending");
            }

            self.fill_phase()?;
            self.check_should_continue()?;
            while self.resolve_inconsistency_once()? {
                self.fill_phase()?;
                self.check_should_continue()?;
            }

            self.heuristic.maybe_trigger(&mut self.table, self.teacher.as_mut())?;
            self.check_should_continue()?;

            match self.conjecture()? {
                EqVerdict::Accepted => {
                    info!("equivalence query accepted the hypothesis, learning complete");
                    return Ok(());
                }
                EqVerdict::CounterexampleFromTeacher(word) => {
                    self.integrate_counterexample(word, true)?;
                }
                EqVerdict::CounterexampleFromLearner(word) => {
                    self.integrate_counterexample(word, false)?;
                }
                EqVerdict::Error => unreachable!("retried to exhaustion by call_with_retry"),
            }
        }
    }

    /// Wraps `ObservationTable::close` with the round it ran in, so the
    /// closure span sits alongside the other phase spans in a session's trace.
    #[instrument(skip(self), fields(round = self.round))]
    fn close_phase(&mut self) -> usize {
        self.table.close()
    }

    #[instrument(skip(self), fields(round = self.round, table_size = self.table.all_prefixes().len(), cache_size = self.table.cache_len()))]
    fn fill_phase(&mut self) -> Result<(), LearnerError> {
        let unfilled = self.table.unfilled_cells();
        if unfilled.is_empty() {
            return Ok(());
        }

        // Batch by word: several (prefix, suffix) positions may denote the
        // same concatenated word, so only one entry per word is sent to the
        // Teacher.
        let mut positions_by_word: HashMap<String, Vec<(Word, Word)>> = HashMap::new();
        let mut words_in_order: Vec<Word> = Vec::new();
        for (prefix, suffix) in unfilled {
            let word = prefix.concat(&suffix);
            let key = word.cache_key().to_string();
            if self.table.contains_word(&key) {
                let belongs = self.table.word_belongs(&key)?;
                self.table.set(&prefix, &suffix, belongs)?;
                continue;
            }
            if !positions_by_word.contains_key(&key) {
                words_in_order.push(word);
            }
            positions_by_word.entry(key).or_default().push((prefix, suffix));
        }

        if words_in_order.is_empty() {
            return Ok(());
        }

        let verdicts = self.call_with_retry(|teacher| {
            let v = teacher.membership_batch(&words_in_order);
            if v.len() != words_in_order.len() {
                return Err(LearnerError::Protocol(format!(
                    "membership_batch returned {} verdicts for {} words",
                    v.len(),
                    words_in_order.len()
                )));
            }
            if v.iter().any(|verdict| matches!(verdict, Verdict::Unknown)) {
                return Err(LearnerError::Transport("membership_batch returned Unknown".to_string()));
            }
            Ok(v)
        })?;

        for (word, verdict) in words_in_order.iter().zip(verdicts) {
            let belongs = verdict.as_bool().expect("Unknown verdicts were rejected above");
            for (prefix, suffix) in &positions_by_word[word.cache_key()] {
                self.table.set(prefix, suffix, belongs)?;
            }
        }
        Ok(())
    }

    /// For every main prefix and every non-suppressed alphabet symbol,
    /// attempts to add the one-symbol extension. Returns whether any new
    /// prefix was added.
    #[instrument(skip(self), fields(round = self.round, table_size = self.table.all_prefixes().len(), cache_size = self.table.cache_len()))]
    fn extension_phase(&mut self) -> Result<bool, LearnerError> {
        let mains = self.table.main_prefixes();
        let alphabet = self.table.alphabet().to_vec();
        let mut added_any = false;
        for m in &mains {
            for &a in &alphabet {
                if self.heuristic.is_suppressed(a) {
                    continue;
                }
                let extension = m.concat(&Word::from_symbols(a.to_string()));
                if self.table.add_prefix(extension, false) {
                    added_any = true;
                }
            }
        }
        Ok(added_any)
    }

    /// Separate from `call_with_retry` because `resolve_inconsistency` needs
    /// simultaneous `&mut` access to `self.table` and `self.teacher`, which a
    /// closure-based helper over `&mut self` as a whole cannot express.
    #[instrument(skip(self), fields(round = self.round, table_size = self.table.all_prefixes().len(), cache_size = self.table.cache_len()))]
    fn resolve_inconsistency_once(&mut self) -> Result<bool, LearnerError> {
        let mut attempt = 0;
        loop {
            match self.table.resolve_inconsistency(self.teacher.as_mut()) {
                Ok(changed) => {
                    self.check_should_continue()?;
                    return Ok(changed);
                }
                Err(e) if e.is_transport() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.backoff_for(attempt);
                    warn!(attempt, ?delay, error = %e, "retrying consistency check after transport error");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[instrument(skip(self), fields(round = self.round, table_size = self.table.all_prefixes().len(), cache_size = self.table.cache_len()))]
    fn conjecture(&mut self) -> Result<EqVerdict, LearnerError> {
        let view = self.table.snapshot_for_equivalence();
        self.call_with_retry(|teacher| match teacher.equivalence(&view) {
            EqVerdict::Error => Err(LearnerError::Transport("equivalence query failed".to_string())),
            other => Ok(other),
        })
    }

    fn integrate_counterexample(&mut self, word: Word, belongs: bool) -> Result<(), LearnerError> {
        self.table.add_word(word.cache_key().to_string(), belongs)?;
        for suffix in word.nonempty_suffixes() {
            self.table.add_suffix(suffix);
        }
        self.heuristic.on_counterexample(&word);
        Ok(())
    }

    /// Runs `f` against the live Teacher, retrying on a `Transport` error per
    /// `self.retry` before surfacing it. Checks `should_continue` once the
    /// call returns successfully.
    fn call_with_retry<T>(&mut self, mut f: impl FnMut(&mut dyn TeacherAdapter) -> Result<T, LearnerError>) -> Result<T, LearnerError> {
        let mut attempt = 0;
        loop {
            match f(self.teacher.as_mut()) {
                Ok(value) => {
                    self.check_should_continue()?;
                    return Ok(value);
                }
                Err(e) if e.is_transport() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.backoff_for(attempt);
                    warn!(attempt, ?delay, error = %e, "retrying Teacher call after transport error");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use regex::Regex;

    use super::*;
    use crate::teacher::{MatMode, ModeParams, TableView};

    /// A regex-backed Teacher for full-loop convergence tests, in the spirit
    /// of the original `RegexTeacher` fixture: membership is a direct regex
    /// match, and equivalence is checked by walking the conjectured DFA
    /// implied by the closed table (derived here, not exposed by the crate)
    /// against every word up to `max_probe_len`.
    struct RegexConjectureTeacher {
        regex: Regex,
        alphabet: Vec<char>,
        max_probe_len: usize,
    }

    impl RegexConjectureTeacher {
        fn new(pattern: &str, alphabet: Vec<char>, max_probe_len: usize) -> Self {
            RegexConjectureTeacher { regex: Regex::new(pattern).expect("valid regex"), alphabet, max_probe_len }
        }

        fn all_words_up_to(&self) -> Vec<String> {
            let mut all = vec![String::new()];
            let mut frontier = vec![String::new()];
            for _ in 0..self.max_probe_len {
                let mut next = Vec::new();
                for w in &frontier {
                    for &a in &self.alphabet {
                        let mut nw = w.clone();
                        nw.push(a);
                        all.push(nw.clone());
                        next.push(nw);
                    }
                }
                frontier = next;
            }
            all
        }

        fn classify(view: &TableView, word: &str) -> bool {
            let mut rows: HashMap<Word, Vec<bool>> = HashMap::new();
            for (p, r) in view.main_prefixes.iter().zip(view.matrix.iter()) {
                rows.insert(p.clone(), r.clone());
            }
            let offset = view.main_prefixes.len();
            for (i, p) in view.extension_prefixes.iter().enumerate() {
                rows.insert(p.clone(), view.matrix[offset + i].clone());
            }
            let state_for_row = |row: &Vec<bool>| -> Word {
                view.main_prefixes
                    .iter()
                    .find(|m| rows[*m] == *row)
                    .cloned()
                    .expect("closed table: every row matches some main prefix")
            };
            let epsilon_index = view.suffixes.iter().position(Word::is_epsilon).expect("epsilon suffix always present");

            let mut state = Word::epsilon();
            for ch in word.chars() {
                let extended = state.concat(&Word::from_symbols(ch.to_string()));
                let row = rows.get(&extended).expect("extension phase covers every main prefix and symbol");
                state = state_for_row(row);
            }
            rows[&state][epsilon_index]
        }
    }

    impl TeacherAdapter for RegexConjectureTeacher {
        fn membership_batch(&mut self, words: &[Word]) -> Vec<Verdict> {
            words
                .iter()
                .map(|w| if self.regex.is_match(w.cache_key()) { Verdict::In } else { Verdict::Out })
                .collect()
        }

        fn equivalence(&mut self, view: &TableView) -> EqVerdict {
            for candidate in self.all_words_up_to() {
                let truth = self.regex.is_match(&candidate);
                let hypothesis = Self::classify(view, &candidate);
                if truth != hypothesis {
                    let word = Word::from_symbols(candidate);
                    return if truth {
                        EqVerdict::CounterexampleFromTeacher(word)
                    } else {
                        EqVerdict::CounterexampleFromLearner(word)
                    };
                }
            }
            EqVerdict::Accepted
        }

        fn configure_mode(&mut self, _mode: MatMode) -> Result<ModeParams, LearnerError> {
            Ok(ModeParams::default())
        }
    }

    /// Re-queries a handful of probe words against both the regex (ground
    /// truth) and the converged table's implied hypothesis, rather than
    /// asserting a table-shape invariant that closure never guarantees
    /// (extensions matching an existing main row stay non-main forever).
    fn assert_hypothesis_agrees_with_regex(regex: &Regex, learner: &Learner, probes: &[&str]) {
        let view = learner.table().snapshot_for_equivalence();
        for &probe in probes {
            assert_eq!(
                RegexConjectureTeacher::classify(&view, probe),
                regex.is_match(probe),
                "hypothesis disagrees with the teacher on {probe:?}"
            );
        }
    }

    #[test]
    fn learns_language_of_odd_a_counts() {
        let pattern = "^(b*ab*){1}(b*ab*b*ab*){0,}$";
        let teacher = RegexConjectureTeacher::new(pattern, vec!['a', 'b'], 5);
        let mut learner = Learner::new(vec!['a', 'b'], Box::new(teacher));
        learner.learn().expect("learner should converge on a regular language");
        assert_hypothesis_agrees_with_regex(
            &Regex::new(pattern).unwrap(),
            &learner,
            &["", "a", "b", "aa", "ab", "ba", "bb", "aba", "bab", "aabb", "abab"],
        );
    }

    #[test]
    fn learns_language_containing_substring_ab() {
        let pattern = "ab";
        let teacher = RegexConjectureTeacher::new(pattern, vec!['a', 'b'], 5);
        let mut learner = Learner::new(vec!['a', 'b'], Box::new(teacher));
        learner.learn().expect("learner should converge on a regular language");
        assert_hypothesis_agrees_with_regex(
            &Regex::new(pattern).unwrap(),
            &learner,
            &["", "a", "b", "aa", "ab", "ba", "bb", "aba", "bab", "aabb", "abab"],
        );
    }

    #[test]
    fn should_continue_predicate_stops_the_loop_with_cancelled() {
        let pattern = "ab";
        let teacher = RegexConjectureTeacher::new(pattern, vec!['a', 'b'], 5);
        let mut learner = Learner::new(vec!['a', 'b'], Box::new(teacher)).with_should_continue(|| false);
        let err = learner.learn().expect_err("a should_continue returning false must stop the loop");
        assert!(matches!(err, LearnerError::Cancelled));
    }
}
