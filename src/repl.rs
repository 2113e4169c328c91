//! REPL evaluation against the live interpreter.
//!
//! Handles, in order: the reentrancy guard, multi-line completeness
//! detection with a pending buffer, dot-prefixed meta commands, and
//! evaluation proper with output capture and timing. Evaluation failures
//! never propagate; they come back as an [`ReplStatus::EvalError`] result.

use std::cell::{Cell, RefCell};
use std::time::Instant;

use log::debug;

use crate::engine::{ScriptEngine, ScriptException};
use crate::inspect::inspect;

/// Outcome classification of one `evaluate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplStatus {
    Success,
    EvalError,
    /// Input is not yet a syntactically complete unit; it was buffered and
    /// will be prepended to the next submission.
    Incomplete,
    CommandNotFound,
    /// A second evaluation was attempted while one was already in progress.
    ReentrancyBlocked,
}

impl ReplStatus {
    /// Wire name used in the `repl_result` event.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplStatus::Success => "success",
            ReplStatus::EvalError => "eval_error",
            ReplStatus::Incomplete => "incomplete",
            ReplStatus::CommandNotFound => "command_not_found",
            ReplStatus::ReentrancyBlocked => "reentrancy_blocked",
        }
    }
}

/// Result of one `evaluate` call. Produced synchronously; not retained
/// beyond the response it generates.
#[derive(Debug)]
pub struct ReplEvalResult {
    pub status: ReplStatus,
    /// Inspect-formatted result value on success; meta command output.
    pub result: Option<String>,
    pub stdout_capture: String,
    pub stderr_capture: String,
    pub execution_time_ms: f64,
    pub exception: Option<ScriptException>,
}

impl ReplEvalResult {
    fn status_only(status: ReplStatus) -> Self {
        Self {
            status,
            result: None,
            stdout_capture: String::new(),
            stderr_capture: String::new(),
            execution_time_ms: 0.0,
            exception: None,
        }
    }

    fn text(status: ReplStatus, text: String) -> Self {
        Self {
            result: Some(text),
            ..Self::status_only(status)
        }
    }
}

/// A built-in REPL meta command, invoked with a leading dot.
#[derive(Debug, Clone, Copy)]
pub struct ReplCommand {
    pub name: &'static str,
    pub description: &'static str,
}

const META_COMMANDS: &[ReplCommand] = &[
    ReplCommand {
        name: "help",
        description: "List available REPL commands",
    },
    ReplCommand {
        name: "history",
        description: "Show previously evaluated input",
    },
    ReplCommand {
        name: "clear",
        description: "Discard the pending multi-line buffer",
    },
];

/// Expression/snippet evaluator with multi-line buffering, output capture
/// and a same-thread reentrancy guard.
///
/// Interior mutability throughout: evaluation can re-enter this type through
/// interpreter callbacks, and the guard has to observe that.
#[derive(Debug, Default)]
pub struct ReplEvaluator {
    pending: RefCell<String>,
    history: RefCell<Vec<String>>,
    in_progress: Cell<bool>,
}

impl ReplEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `code` (concatenated with any pending incomplete input)
    /// against the engine.
    pub fn evaluate(&self, engine: &dyn ScriptEngine, code: &str) -> ReplEvalResult {
        if self.in_progress.get() {
            debug!("repl: blocked reentrant evaluation");
            return ReplEvalResult::status_only(ReplStatus::ReentrancyBlocked);
        }

        // Meta commands bypass buffering entirely: `.clear` has to work
        // precisely when input is pending. A dot-leading line that names no
        // known command is only an error on fresh input; with a buffer
        // pending it is continuation text (a chained method call).
        if let Some(name) = code.trim().strip_prefix('.') {
            let name = name.trim();
            if META_COMMANDS.iter().any(|c| c.name == name) {
                return self.run_meta_command(name);
            }
            if self.pending.borrow().is_empty() {
                return ReplEvalResult::status_only(ReplStatus::CommandNotFound);
            }
        }

        let full = {
            let pending = self.pending.borrow();
            if pending.is_empty() {
                code.to_string()
            } else {
                format!("{}\n{}", pending, code)
            }
        };

        if !is_complete(&full) {
            *self.pending.borrow_mut() = full;
            return ReplEvalResult::status_only(ReplStatus::Incomplete);
        }
        self.pending.borrow_mut().clear();
        self.history.borrow_mut().push(full.clone());

        self.in_progress.set(true);
        engine.begin_output_capture();
        let start = Instant::now();
        let outcome = engine.eval(&full, 0);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        // Capture always ends, even when evaluation raised.
        let captured = engine.end_output_capture();
        self.in_progress.set(false);

        match outcome {
            Ok(value) => ReplEvalResult {
                status: ReplStatus::Success,
                result: Some(inspect(&value)),
                stdout_capture: captured.stdout,
                stderr_capture: captured.stderr,
                execution_time_ms: elapsed_ms,
                exception: None,
            },
            Err(exception) => ReplEvalResult {
                status: ReplStatus::EvalError,
                result: None,
                stdout_capture: captured.stdout,
                stderr_capture: captured.stderr,
                execution_time_ms: elapsed_ms,
                exception: Some(exception),
            },
        }
    }

    /// Completeness check for the IDE's continuation-prompt decision.
    /// Considers the pending buffer, as `evaluate` would.
    pub fn check_complete(&self, code: &str) -> bool {
        let pending = self.pending.borrow();
        if pending.is_empty() {
            is_complete(code)
        } else {
            is_complete(&format!("{}\n{}", pending, code))
        }
    }

    /// Discard any buffered incomplete input.
    pub fn clear_buffer(&self) {
        self.pending.borrow_mut().clear();
    }

    /// Currently buffered incomplete input.
    pub fn pending(&self) -> String {
        self.pending.borrow().clone()
    }

    /// The built-in meta command registry.
    pub fn commands(&self) -> &'static [ReplCommand] {
        META_COMMANDS
    }

    fn run_meta_command(&self, name: &str) -> ReplEvalResult {
        match name {
            "help" => {
                let listing = META_COMMANDS
                    .iter()
                    .map(|c| format!(".{} - {}", c.name, c.description))
                    .collect::<Vec<_>>()
                    .join("\n");
                ReplEvalResult::text(ReplStatus::Success, listing)
            }
            "history" => {
                let listing = self.history.borrow().join("\n");
                ReplEvalResult::text(ReplStatus::Success, listing)
            }
            "clear" => {
                self.clear_buffer();
                ReplEvalResult::text(ReplStatus::Success, "buffer cleared".to_string())
            }
            _ => ReplEvalResult::status_only(ReplStatus::CommandNotFound),
        }
    }
}

/// Block-opening keywords that are never expression modifiers.
const BLOCK_KEYWORDS: &[&str] = &["def", "class", "module", "begin", "case"];

/// Keywords that open a block only in statement position (otherwise they
/// are trailing modifiers, as in `x if y`).
const STATEMENT_KEYWORDS: &[&str] = &["if", "unless", "while", "until", "for"];

/// Characters that, when last on the input, mark an explicit continuation.
const CONTINUATION_CHARS: &[char] = &['\\', ',', '.', '+', '-', '*', '/', '%', '&', '|', '=', '<', '>'];

/// Whether `code` forms a syntactically complete unit: balanced
/// parens/brackets/braces, no open string, balanced block keywords, and no
/// trailing continuation marker. All must hold simultaneously.
pub fn is_complete(code: &str) -> bool {
    let mut delims: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut block_depth: i32 = 0;
    let mut last_sig: Option<char> = None;

    for line in code.lines() {
        let mut word = String::new();
        let mut first_word = true;
        let mut after_dot = false;
        let mut line_opened_loop = false;

        // Flush the pending identifier and apply keyword rules.
        let flush = |word: &mut String,
                         first_word: &mut bool,
                         after_dot: bool,
                         line_opened_loop: &mut bool,
                         block_depth: &mut i32| {
            if word.is_empty() {
                return;
            }
            if !after_dot {
                if BLOCK_KEYWORDS.contains(&word.as_str()) {
                    *block_depth += 1;
                } else if STATEMENT_KEYWORDS.contains(&word.as_str()) {
                    if *first_word {
                        *block_depth += 1;
                        *line_opened_loop = true;
                    }
                } else if word == "do" {
                    // `while x do` already counted the opener.
                    if !*line_opened_loop {
                        *block_depth += 1;
                    }
                } else if word == "end" {
                    *block_depth -= 1;
                }
            }
            word.clear();
            *first_word = false;
        };

        for c in line.chars() {
            if let Some(q) = quote {
                last_sig = Some(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }

            match c {
                '#' => {
                    // Comment to end of line.
                    flush(&mut word, &mut first_word, after_dot, &mut line_opened_loop, &mut block_depth);
                    break;
                }
                '"' | '\'' => {
                    flush(&mut word, &mut first_word, after_dot, &mut line_opened_loop, &mut block_depth);
                    after_dot = false;
                    quote = Some(c);
                    last_sig = Some(c);
                }
                '(' | '[' | '{' => {
                    flush(&mut word, &mut first_word, after_dot, &mut line_opened_loop, &mut block_depth);
                    after_dot = false;
                    delims.push(c);
                    last_sig = Some(c);
                }
                ')' | ']' | '}' => {
                    flush(&mut word, &mut first_word, after_dot, &mut line_opened_loop, &mut block_depth);
                    after_dot = false;
                    let open = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    if delims.last() == Some(&open) {
                        delims.pop();
                    }
                    last_sig = Some(c);
                }
                c if c.is_alphanumeric() || c == '_' || c == '?' || c == '!' => {
                    word.push(c);
                    last_sig = Some(c);
                }
                '.' => {
                    flush(&mut word, &mut first_word, after_dot, &mut line_opened_loop, &mut block_depth);
                    after_dot = true;
                    last_sig = Some(c);
                }
                c if c.is_whitespace() => {
                    flush(&mut word, &mut first_word, after_dot, &mut line_opened_loop, &mut block_depth);
                    after_dot = false;
                }
                _ => {
                    flush(&mut word, &mut first_word, after_dot, &mut line_opened_loop, &mut block_depth);
                    after_dot = false;
                    last_sig = Some(c);
                }
            }
        }
        flush(&mut word, &mut first_word, after_dot, &mut line_opened_loop, &mut block_depth);
    }

    let continuation = last_sig.is_some_and(|c| CONTINUATION_CHARS.contains(&c));

    delims.is_empty() && quote.is_none() && block_depth <= 0 && !continuation
}
