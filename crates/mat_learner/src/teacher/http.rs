//! HTTP-JSON Teacher Adapter: the MAT is an external process speaking a small
//! wire protocol (`/generate`, `/checkWord`, `/check-word-batch`, `/checkTable`).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::error::LearnerError;
use crate::word::Word;

use super::{EqVerdict, MatMode, ModeParams, TableView, TeacherAdapter, Verdict};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    mode: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(rename = "maxLexemeSize")]
    max_lexeme_size: u32,
    #[serde(rename = "maxBracketNesting")]
    max_bracket_nesting: u32,
}

#[derive(Serialize)]
struct CheckWordRequest<'a> {
    word: &'a str,
}

#[derive(Deserialize)]
struct CheckWordResponse {
    response: String,
}

#[derive(Serialize)]
struct CheckWordBatchRequest<'a> {
    #[serde(rename = "wordList")]
    word_list: Vec<&'a str>,
}

#[derive(Deserialize)]
struct CheckWordBatchResponse {
    #[serde(rename = "responseList")]
    response_list: Vec<bool>,
}

#[derive(Serialize)]
struct CheckTableRequest {
    main_prefixes: String,
    non_main_prefixes: String,
    suffixes: String,
    table: String,
}

#[derive(Deserialize)]
struct CheckTableResponse {
    response: String,
    #[serde(rename = "type")]
    kind: Option<bool>,
}

/// Client for an HTTP MAT. The Learner Loop is single-threaded and cooperative,
/// so a blocking client is the right shape — there is never more than one
/// in-flight call.
pub struct HttpTeacher {
    client: reqwest::blocking::Client,
    base_url: String,
    epsilon_token: String,
}

impl HttpTeacher {
    pub fn new(server_address: &str, server_port: &str, epsilon_token: impl Into<String>, timeout: Duration) -> Result<Self, LearnerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LearnerError::Transport(e.to_string()))?;
        Ok(HttpTeacher {
            client,
            base_url: format!("http://{server_address}:{server_port}"),
            epsilon_token: epsilon_token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl TeacherAdapter for HttpTeacher {
    #[instrument(skip(self))]
    fn membership_batch(&mut self, words: &[Word]) -> Vec<Verdict> {
        if words.is_empty() {
            return Vec::new();
        }
        let rendered: Vec<String> = words.iter().map(|w| w.render(&self.epsilon_token)).collect();
        let word_list: Vec<&str> = rendered.iter().map(String::as_str).collect();

        let result = self
            .client
            .post(self.url("/check-word-batch"))
            .json(&CheckWordBatchRequest { word_list })
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<CheckWordBatchResponse>());

        match result {
            Ok(body) => {
                if body.response_list.len() != words.len() {
                    warn!(
                        expected = words.len(),
                        got = body.response_list.len(),
                        "check-word-batch response length mismatch"
                    );
                    return vec![Verdict::Unknown; words.len()];
                }
                body.response_list
                    .into_iter()
                    .map(|b| if b { Verdict::In } else { Verdict::Out })
                    .collect()
            }
            Err(e) => {
                warn!(error = %e, "check-word-batch transport failure");
                vec![Verdict::Unknown; words.len()]
            }
        }
    }

    #[instrument(skip(self))]
    fn membership(&mut self, word: &Word) -> Verdict {
        let rendered = word.render(&self.epsilon_token);
        let result = self
            .client
            .post(self.url("/checkWord"))
            .json(&CheckWordRequest { word: &rendered })
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<CheckWordResponse>());

        match result {
            Ok(body) => match body.response.as_str() {
                "1" => Verdict::In,
                "0" => Verdict::Out,
                other => {
                    warn!(response = other, "checkWord returned an unrecognized value");
                    Verdict::Unknown
                }
            },
            Err(e) => {
                warn!(error = %e, "checkWord transport failure");
                Verdict::Unknown
            }
        }
    }

    #[instrument(skip(self, view))]
    fn equivalence(&mut self, view: &TableView) -> EqVerdict {
        let render_all = |words: &[Word]| -> String {
            words
                .iter()
                .map(|w| w.render(&self.epsilon_token))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let render_row = |row: &[bool]| -> Vec<String> {
            row.iter().map(|&b| if b { "1".to_string() } else { "0".to_string() }).collect()
        };

        let mut table_cells = Vec::new();
        for row in &view.matrix {
            table_cells.extend(render_row(row));
        }

        let request = CheckTableRequest {
            main_prefixes: render_all(&view.main_prefixes),
            non_main_prefixes: render_all(&view.extension_prefixes),
            suffixes: render_all(&view.suffixes),
            table: table_cells.join(" "),
        };

        let result = self
            .client
            .post(self.url("/checkTable"))
            .json(&request)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<CheckTableResponse>());

        match result {
            Ok(body) => match body.kind {
                None => EqVerdict::Accepted,
                Some(true) => {
                    EqVerdict::CounterexampleFromTeacher(Word::parse(&body.response, &self.epsilon_token))
                }
                Some(false) => {
                    EqVerdict::CounterexampleFromLearner(Word::parse(&body.response, &self.epsilon_token))
                }
            },
            Err(e) => {
                warn!(error = %e, "checkTable transport failure");
                EqVerdict::Error
            }
        }
    }

    #[instrument(skip(self))]
    fn configure_mode(&mut self, mode: MatMode) -> Result<ModeParams, LearnerError> {
        let body: GenerateResponse = self
            .client
            .post(self.url("/generate"))
            .json(&GenerateRequest { mode: mode.as_str() })
            .send()
            .map_err(|e| LearnerError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| LearnerError::Transport(e.to_string()))?
            .json()
            .map_err(|e| LearnerError::Protocol(e.to_string()))?;

        Ok(ModeParams {
            max_lexeme_size: body.max_lexeme_size,
            max_bracket_nesting: body.max_bracket_nesting,
        })
    }
}
