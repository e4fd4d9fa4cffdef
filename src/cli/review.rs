//! Interactive page review
//!
//! Reads operator commands line by line and drives one page's gate until
//! the page is committed, skipped or the operator quits.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use tracing::debug;

use crate::analysis::CandidateId;
use crate::pipeline::{PageProcessor, PageReview};
use crate::validation::{CandidateState, Confirmation, DocumentSession, ValidatedIdentifier};

/// One parsed operator command
///
/// Candidate numbers are the 1-based positions shown by `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    List,
    Confirm { number: usize, text: Option<String> },
    Authorize { number: usize, token: String, text: Option<String> },
    Reject { number: usize },
    Correct { number: usize, text: String },
    Add { text: String },
    Manual,
    ConfirmPage,
    Skip,
    Quit,
    Help,
}

pub const HELP: &str = "\
Commands:
  list                          show candidates
  confirm <n> [value]           validate candidate n, optionally retyped
  authorize <n> <token> [value] validate with the supervisor token
  reject <n>                    reject candidate n
  correct <n> <value>           replace the shown value of candidate n
  add <value>                   add a manual candidate
  manual                        re-enter the page by hand, one identifier per line
  page                          confirm the page
  skip                          leave the page uncommitted
  quit                          stop reviewing";

fn parse_number(arg: Option<&str>) -> Result<usize> {
    let arg = arg.context("Missing candidate number")?;
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => bail!("Invalid candidate number '{}'", arg),
    }
}

/// Parse one input line
pub fn parse_command(line: &str) -> Result<OperatorCommand> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let mut args = rest.splitn(2, char::is_whitespace);
    let first = args.next().filter(|s| !s.is_empty());
    let remainder = || args.clone().next().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    let command = match verb.to_lowercase().as_str() {
        "list" | "l" | "ls" => OperatorCommand::List,
        "confirm" | "c" if first == Some("page") => OperatorCommand::ConfirmPage,
        "confirm" | "c" => OperatorCommand::Confirm {
            number: parse_number(first)?,
            text: remainder(),
        },
        "authorize" | "confirm-with-token" | "a" => {
            let number = parse_number(first)?;
            let rest = remainder().context("Missing supervisor token")?;
            let (token, text) = match rest.split_once(char::is_whitespace) {
                Some((token, text)) => (token.to_string(), Some(text.trim().to_string())),
                None => (rest, None),
            };
            OperatorCommand::Authorize { number, token, text }
        }
        "reject" | "r" => OperatorCommand::Reject {
            number: parse_number(first)?,
        },
        "correct" | "e" => OperatorCommand::Correct {
            number: parse_number(first)?,
            text: remainder().context("Missing corrected value")?,
        },
        "add" => {
            if rest.is_empty() {
                bail!("Missing value to add");
            }
            OperatorCommand::Add { text: rest.to_string() }
        }
        "manual" | "m" => OperatorCommand::Manual,
        "page" | "p" => OperatorCommand::ConfirmPage,
        "skip" | "s" => OperatorCommand::Skip,
        "quit" | "q" | "exit" => OperatorCommand::Quit,
        "help" | "h" | "?" => OperatorCommand::Help,
        "" => bail!("Empty command"),
        other => bail!("Unknown command '{}' (try 'help')", other),
    };
    Ok(command)
}

/// How the review of one page ended
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Committed(Vec<ValidatedIdentifier>),
    Skipped,
    Quit,
}

/// Drives the gate of one page from operator input
pub struct ReviewDriver<'a, R, W> {
    processor: &'a PageProcessor,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: Write> ReviewDriver<'a, R, W> {
    pub fn new(processor: &'a PageProcessor, input: R, output: W) -> Self {
        Self {
            processor,
            input,
            output,
        }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn candidate_id(review: &PageReview, number: usize) -> Result<CandidateId> {
        review
            .gate
            .entries()
            .get(number - 1)
            .map(|e| e.id())
            .with_context(|| format!("No candidate {}", number))
    }

    /// Print the page's candidates
    pub fn list(&mut self, review: &PageReview) -> Result<()> {
        writeln!(self.output, "Page {}:", review.page_index + 1)?;
        if review.gate.entries().is_empty() {
            writeln!(self.output, "  (no candidates; use 'add' or 'manual')")?;
        }
        for (i, (entry, view)) in review
            .gate
            .entries()
            .iter()
            .zip(self.processor.views(&review.gate))
            .enumerate()
        {
            let state = match entry.state() {
                CandidateState::Pending => "pending",
                CandidateState::Validated => "validated",
                CandidateState::Rejected => "rejected",
            };
            let confidence = view
                .confidence
                .map(|c| format!("{:.1}%", c * 100.0))
                .unwrap_or_else(|| "manual".to_string());
            write!(
                self.output,
                "  {}. [{}] {} (read '{}', {})",
                i + 1,
                state,
                view.annotated,
                view.raw,
                confidence
            )?;
            if view.needs_manual_entry {
                write!(self.output, " needs manual entry")?;
            }
            writeln!(self.output)?;
            if !view.alternatives.is_empty() {
                writeln!(self.output, "       or: {}", view.alternatives.join(", "))?;
            }
        }
        Ok(())
    }

    fn read_manual_text(&mut self, review: &PageReview) -> Result<String> {
        writeln!(self.output, "Recognized text: {}", review.raw_text)?;
        writeln!(self.output, "Enter one identifier per line, empty line to finish:")?;
        let mut text = String::new();
        while let Some(line) = self.read_line()? {
            if line.trim().is_empty() {
                break;
            }
            text.push_str(&line);
            text.push('\n');
        }
        Ok(text)
    }

    fn apply(&mut self, review: &mut PageReview, command: OperatorCommand) -> Result<()> {
        match command {
            OperatorCommand::Confirm { number, text } => {
                let id = Self::candidate_id(review, number)?;
                let confirmation = match text {
                    Some(text) => Confirmation::with_text(text),
                    None => Confirmation::as_shown(),
                };
                let validated = review.gate.confirm(id, confirmation)?;
                writeln!(self.output, "Validated {}", validated.value)?;
            }
            OperatorCommand::Authorize { number, token, text } => {
                let id = Self::candidate_id(review, number)?;
                let confirmation = match text {
                    Some(text) => Confirmation::with_text(text),
                    None => Confirmation::as_shown(),
                };
                let validated = review.gate.confirm(id, confirmation.authorized(token))?;
                writeln!(self.output, "Validated {}", validated.value)?;
            }
            OperatorCommand::Reject { number } => {
                let id = Self::candidate_id(review, number)?;
                review.gate.reject(id)?;
                writeln!(self.output, "Rejected {}", number)?;
            }
            OperatorCommand::Correct { number, text } => {
                let id = Self::candidate_id(review, number)?;
                review.gate.correct(id, &text)?;
                self.list(review)?;
            }
            OperatorCommand::Add { text } => {
                review.gate.add_manual(&text)?;
                self.list(review)?;
            }
            OperatorCommand::Manual => {
                let text = self.read_manual_text(review)?;
                review.gate = self.processor.manual_review(review.page_index, &text);
                self.list(review)?;
            }
            OperatorCommand::List => self.list(review)?,
            OperatorCommand::Help => writeln!(self.output, "{}", HELP)?,
            OperatorCommand::ConfirmPage | OperatorCommand::Skip | OperatorCommand::Quit => {}
        }
        Ok(())
    }

    /// Run the command loop for one page
    ///
    /// End of input counts as quitting.
    pub fn review_page(&mut self, review: &mut PageReview, session: &mut DocumentSession) -> Result<PageOutcome> {
        if let Some(e) = &review.recognition_error {
            writeln!(self.output, "Warning: {}", e)?;
        }
        if review.dropped_fragments > 0 {
            writeln!(self.output, "Warning: {} unreadable fragment(s) ignored", review.dropped_fragments)?;
        }
        self.list(review)?;

        loop {
            write!(self.output, "> ")?;
            self.output.flush()?;

            let Some(line) = self.read_line()? else {
                return Ok(PageOutcome::Quit);
            };
            if line.trim().is_empty() {
                continue;
            }

            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(e) => {
                    writeln!(self.output, "{}", e)?;
                    continue;
                }
            };
            debug!("Page {}: {:?}", review.page_index, command);

            match command {
                OperatorCommand::ConfirmPage => match session.commit_page(&mut review.gate) {
                    Ok(validated) => {
                        writeln!(self.output, "Page {} confirmed ({} identifier(s))", review.page_index + 1, validated.len())?;
                        return Ok(PageOutcome::Committed(validated));
                    }
                    Err(e) => writeln!(self.output, "{}", e)?,
                },
                OperatorCommand::Skip => return Ok(PageOutcome::Skipped),
                OperatorCommand::Quit => return Ok(PageOutcome::Quit),
                other => {
                    if let Err(e) = self.apply(review, other) {
                        writeln!(self.output, "{:#}", e)?;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::vision::JsonDetectionsEngine;
    use std::io::Cursor;

    const SERIAL_PAGE: &str = r#"[{"text":"S/N 12-AB","bbox":[[0,0],[50,0],[50,10],[0,10]],"confidence":0.95}]"#;

    fn run_script(json: &str, script: &str) -> (PageOutcome, DocumentSession, String) {
        let processor = PageProcessor::from_config(&AppConfig::default()).unwrap();
        let mut review = processor.process_page(0, &JsonDetectionsEngine, json.as_bytes());
        let mut session = DocumentSession::new(false);
        let mut output = Vec::new();

        let outcome = {
            let mut driver = ReviewDriver::new(&processor, Cursor::new(script.to_string()), &mut output);
            driver.review_page(&mut review, &mut session).unwrap()
        };
        (outcome, session, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("list").unwrap(), OperatorCommand::List);
        assert_eq!(
            parse_command("confirm 2").unwrap(),
            OperatorCommand::Confirm { number: 2, text: None }
        );
        assert_eq!(
            parse_command("c 1  12A8 ").unwrap(),
            OperatorCommand::Confirm {
                number: 1,
                text: Some("12A8".to_string())
            }
        );
        assert_eq!(parse_command("confirm page").unwrap(), OperatorCommand::ConfirmPage);
        assert_eq!(
            parse_command("authorize 3 chef S0-1").unwrap(),
            OperatorCommand::Authorize {
                number: 3,
                token: "chef".to_string(),
                text: Some("S0-1".to_string())
            }
        );
        assert_eq!(
            parse_command("correct 1 XY 99").unwrap(),
            OperatorCommand::Correct {
                number: 1,
                text: "XY 99".to_string()
            }
        );
        assert_eq!(
            parse_command("add AB-12 CD").unwrap(),
            OperatorCommand::Add {
                text: "AB-12 CD".to_string()
            }
        );
        assert_eq!(parse_command("Q").unwrap(), OperatorCommand::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("confirm").is_err());
        assert!(parse_command("confirm 0").is_err());
        assert!(parse_command("reject x").is_err());
        assert!(parse_command("authorize 1").is_err());
        assert!(parse_command("correct 1").is_err());
        assert!(parse_command("add").is_err());
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn test_low_confidence_page_requires_retyping() {
        let (outcome, session, output) = run_script(SERIAL_PAGE, "confirm 1\npage\nconfirm 1 12A8\npage\n");

        assert!(output.contains("[B]"));
        assert!(output.contains("retype a corrected value"));
        assert!(output.contains("unresolved"));
        match outcome {
            PageOutcome::Committed(ids) => assert_eq!(ids[0].value, "12A8"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(session.identifiers().len(), 1);
    }

    #[test]
    fn test_manual_entry_replaces_candidates() {
        let (outcome, _, output) = run_script("garbage", "manual\nAB-1\nCD 2\n\nconfirm 1\nconfirm 2\npage\n");

        assert!(output.contains("Warning"));
        match outcome {
            PageOutcome::Committed(ids) => {
                let values: Vec<&str> = ids.iter().map(|i| i.value.as_str()).collect();
                assert_eq!(values, vec!["AB1", "CD2"]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_skip_and_end_of_input() {
        let (outcome, session, _) = run_script(SERIAL_PAGE, "reject 1\nskip\n");
        assert_eq!(outcome, PageOutcome::Skipped);
        assert!(session.identifiers().is_empty());

        let (outcome, _, _) = run_script(SERIAL_PAGE, "list\n");
        assert_eq!(outcome, PageOutcome::Quit);
    }
}
