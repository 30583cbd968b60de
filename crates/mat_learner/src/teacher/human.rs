//! Interactive console Teacher Adapter: prompts an operator on stdin/stdout.

use std::io::{self, BufRead, Write};

use tracing::warn;

use crate::error::LearnerError;
use crate::word::Word;

use super::{EqVerdict, MatMode, ModeParams, TableView, TeacherAdapter, Verdict};

const MAX_REPROMPTS: usize = 3;

/// A human standing in for the MAT. Unparseable input is reprompted (bounded)
/// rather than treated as learning progress, per the UserInputError policy.
pub struct HumanTeacher<R, W> {
    input: R,
    output: W,
    epsilon_token: String,
}

impl HumanTeacher<io::BufReader<io::Stdin>, io::Stdout> {
    pub fn on_stdio(epsilon_token: impl Into<String>) -> Self {
        HumanTeacher {
            input: io::BufReader::new(io::stdin()),
            output: io::stdout(),
            epsilon_token: epsilon_token.into(),
        }
    }
}

impl<R: BufRead, W: Write> HumanTeacher<R, W> {
    pub fn new(input: R, output: W, epsilon_token: impl Into<String>) -> Self {
        HumanTeacher { input, output, epsilon_token: epsilon_token.into() }
    }

    fn prompt(&mut self, text: &str) -> Result<String, LearnerError> {
        write!(self.output, "{text}").map_err(|e| LearnerError::UserInput(e.to_string()))?;
        self.output.flush().map_err(|e| LearnerError::UserInput(e.to_string()))?;
        let mut line = String::new();
        self.input
            .read_line(&mut line)
            .map_err(|e| LearnerError::UserInput(e.to_string()))?;
        Ok(line.trim().to_string())
    }

    fn ask_membership(&mut self, word: &Word) -> Verdict {
        let rendered = word.render(&self.epsilon_token);
        for _ in 0..MAX_REPROMPTS {
            match self.prompt(&format!("Is '{rendered}' a word of the language? (1/0): ")) {
                Ok(answer) => match answer.as_str() {
                    "1" => return Verdict::In,
                    "0" => return Verdict::Out,
                    other => warn!(response = other, "unparseable membership answer, reprompting"),
                },
                Err(e) => {
                    warn!(error = %e, "failed to read membership answer");
                    return Verdict::Unknown;
                }
            }
        }
        Verdict::Unknown
    }

    fn print_table(&mut self, view: &TableView) {
        let _ = write!(self.output, "   ");
        for suffix in &view.suffixes {
            let _ = write!(self.output, "{} ", suffix.render(&self.epsilon_token));
        }
        let _ = writeln!(self.output);

        let rows = view.main_prefixes.iter().zip(view.matrix.iter()).map(|(p, r)| (p, r, true)).chain(
            view.extension_prefixes
                .iter()
                .zip(view.matrix.iter().skip(view.main_prefixes.len()))
                .map(|(p, r)| (p, r, false)),
        );
        for (prefix, row, is_main) in rows {
            let marker = if is_main { "(M)" } else { "" };
            let _ = write!(self.output, "{}{marker} ", prefix.render(&self.epsilon_token));
            for &value in row {
                let _ = write!(self.output, "{} ", if value { '+' } else { '-' });
            }
            let _ = writeln!(self.output);
        }
    }
}

impl<R: BufRead, W: Write> TeacherAdapter for HumanTeacher<R, W> {
    fn membership_batch(&mut self, words: &[Word]) -> Vec<Verdict> {
        words.iter().map(|w| self.ask_membership(w)).collect()
    }

    fn equivalence(&mut self, view: &TableView) -> EqVerdict {
        self.print_table(view);
        for _ in 0..MAX_REPROMPTS {
            match self.prompt("Is the table above correct? (true/<counterexample>): ") {
                Ok(answer) if answer == "true" => return EqVerdict::Accepted,
                Ok(answer) if !answer.is_empty() => {
                    let word = Word::parse(&answer, &self.epsilon_token);
                    match self.prompt("Is this counterexample a word of the language? (true/false): ") {
                        Ok(kind) if kind == "true" => return EqVerdict::CounterexampleFromTeacher(word),
                        Ok(kind) if kind == "false" => return EqVerdict::CounterexampleFromLearner(word),
                        Ok(other) => warn!(response = %other, "unparseable counterexample type, reprompting"),
                        Err(e) => {
                            warn!(error = %e, "failed to read counterexample type");
                            return EqVerdict::Error;
                        }
                    }
                }
                Ok(_) => warn!("empty equivalence answer, reprompting"),
                Err(e) => {
                    warn!(error = %e, "failed to read equivalence answer");
                    return EqVerdict::Error;
                }
            }
        }
        EqVerdict::Error
    }

    fn configure_mode(&mut self, _mode: MatMode) -> Result<ModeParams, LearnerError> {
        Ok(ModeParams::default())
    }
}
