//! Teacher Adapter: the non-owning collaborator exposing membership and
//! equivalence queries to a MAT, as an HTTP-JSON oracle or an interactive
//! human. The Learner Loop holds a `Box<dyn TeacherAdapter>` and never stores
//! table state in it.

pub mod http;
pub mod human;

use crate::error::LearnerError;
use crate::word::Word;

/// The answer to a single membership query. `Unknown` only arises from a
/// transport failure and is the Learner's cue to retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    In,
    Out,
    Unknown,
}

impl Verdict {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Verdict::In => Some(true),
            Verdict::Out => Some(false),
            Verdict::Unknown => None,
        }
    }
}

/// The answer to an equivalence query, modeled as a tagged variant rather than
/// two loosely-coupled strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EqVerdict {
    Accepted,
    CounterexampleFromTeacher(Word),
    CounterexampleFromLearner(Word),
    Error,
}

/// Difficulty hint forwarded to an HTTP MAT via `configure_mode`; a no-op for
/// the human teacher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatMode {
    Easy,
    Medium,
    Hard,
}

impl MatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatMode::Easy => "easy",
            MatMode::Medium => "medium",
            MatMode::Hard => "hard",
        }
    }
}

/// Opaque difficulty parameters returned by `/generate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ModeParams {
    pub max_lexeme_size: u32,
    pub max_bracket_nesting: u32,
}

/// The rectangular view of the observation table handed to the Teacher for an
/// equivalence query: main-prefix list, extension-prefix list, suffix list,
/// and the `{In,Out}` matrix (main rows first, then extension rows), with
/// `ε` kept as an explicit, distinguished token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableView {
    pub main_prefixes: Vec<Word>,
    pub extension_prefixes: Vec<Word>,
    pub suffixes: Vec<Word>,
    /// Row-major: `main_prefixes` rows first, then `extension_prefixes` rows,
    /// each row across `suffixes` in order. `true` = In.
    pub matrix: Vec<Vec<bool>>,
}

/// The contract a MAT client must provide. `membership` has a default
/// implementation on top of `membership_batch` (batch-of-one) so there is
/// exactly one parsing/validation path per adapter.
pub trait TeacherAdapter {
    fn membership(&mut self, word: &Word) -> Verdict {
        self.membership_batch(std::slice::from_ref(word))
            .into_iter()
            .next()
            .unwrap_or(Verdict::Unknown)
    }

    fn membership_batch(&mut self, words: &[Word]) -> Vec<Verdict>;

    fn equivalence(&mut self, view: &TableView) -> EqVerdict;

    fn configure_mode(&mut self, mode: MatMode) -> Result<ModeParams, LearnerError>;
}
