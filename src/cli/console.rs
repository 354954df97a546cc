//! Line-based operator console
//!
//! Accepted answers: `p`/`pass`, `f`/`fail`, `s`/`skip`, `a`/`abort` and
//! `r <id>`/`rerun <id>`, optionally followed by `: note`.

use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

use crate::checklist::Step;
use crate::common::{Error, Result};
use crate::engine::{
    Operator, OperatorAnswer, OperatorReply, Prompt, Provisional, ReviewReply, StepResult,
};

/// Parse a confirmation answer
pub fn parse_reply(line: &str) -> std::result::Result<OperatorReply, String> {
    let (command, note) = match line.split_once(':') {
        Some((command, note)) => {
            let note = note.trim();
            (command.trim(), (!note.is_empty()).then(|| note.to_string()))
        }
        None => (line.trim(), None),
    };

    let mut words = command.split_whitespace();
    let verb = words.next().unwrap_or("").to_ascii_lowercase();
    let target = words.next();

    let answer = match (verb.as_str(), target) {
        ("p" | "pass", None) => OperatorAnswer::Pass,
        ("f" | "fail", None) => OperatorAnswer::Fail,
        ("s" | "skip", None) => OperatorAnswer::Skip,
        ("a" | "abort", None) => OperatorAnswer::Abort,
        ("r" | "rerun", Some(id)) => return Ok(OperatorReply::Rerun(id.to_string())),
        ("r" | "rerun", None) => return Err("rerun needs a step id, e.g. 'r stream-h264'".into()),
        ("", _) => return Err("an answer is required".into()),
        _ => return Err(format!("unrecognised answer '{}'", command)),
    };
    Ok(OperatorReply::Answer { answer, note })
}

/// Parse a review answer; an empty line finishes the session
pub fn parse_review(line: &str) -> std::result::Result<ReviewReply, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or("").to_ascii_lowercase();
    match (verb.as_str(), words.next()) {
        ("" | "d" | "done" | "finish", None) => Ok(ReviewReply::Finish),
        ("a" | "abort", None) => Ok(ReviewReply::Abort),
        ("r" | "rerun", Some(id)) => Ok(ReviewReply::Rerun(id.to_string())),
        ("r" | "rerun", None) => Err("rerun needs a step id".into()),
        _ => Err(format!("unrecognised answer '{}'", line.trim())),
    }
}

/// Operator channel on a terminal (or any line reader)
pub struct ConsoleOperator<R> {
    input: R,
}

impl ConsoleOperator<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> ConsoleOperator<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self.input.read_line(&mut line).await?;
        if read == 0 {
            return Err(Error::Operator("input closed".to_string()));
        }
        Ok(line.trim().to_string())
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Operator for ConsoleOperator<R> {
    async fn announce(&mut self, step: &Step, position: usize, total: usize) {
        println!(
            "\n{} {}",
            format!("[{}/{}]", position, total).blue().bold(),
            step.title.white().bold()
        );
        println!("  {}", step.id.dimmed());
        for (i, instruction) in step.instructions.iter().enumerate() {
            println!("  {}. {}", i + 1, instruction.replace('\n', "\n     "));
        }
        println!("  {} {}", "Expected:".cyan(), step.expected_outcome);
        if let Some(check) = &step.automated_check {
            println!("  {}", format!("Running {} check...", check.capability).dimmed());
        }
    }

    async fn confirm(&mut self, prompt: &Prompt<'_>) -> Result<OperatorReply> {
        match prompt.provisional {
            Some(Provisional::Pass) => println!(
                "  {} {}",
                "✓ check passed".green(),
                prompt.evidence.unwrap_or_default().dimmed()
            ),
            Some(Provisional::Fail) => println!(
                "  {} {} {}",
                "✗ check failed".red(),
                format!("after {} attempt(s):", prompt.attempts).dimmed(),
                prompt.evidence.unwrap_or_default()
            ),
            None => {}
        }

        let hint = if prompt.rerun {
            "[p]ass [f]ail [s]kip [a]bort"
        } else {
            "[p]ass [f]ail [s]kip [a]bort r <id>"
        };
        loop {
            print!("  {} ", format!("{} >", hint).cyan());
            flush();
            let line = self.read_line().await?;
            match parse_reply(&line) {
                Ok(reply) => return Ok(reply),
                Err(e) => println!("  {}", e.yellow()),
            }
        }
    }

    async fn review(&mut self, results: &[StepResult]) -> Result<ReviewReply> {
        println!("\n{}", "All steps executed:".cyan());
        for result in results {
            println!("  {:<8} {}", result.status.to_string(), result.step_id);
        }
        loop {
            print!("  {} ", "[enter] finish, r <id> re-run, [a]bort >".cyan());
            flush();
            let line = self.read_line().await?;
            match parse_review(&line) {
                Ok(reply) => return Ok(reply),
                Err(e) => println!("  {}", e.yellow()),
            }
        }
    }

    fn notify(&mut self, message: &str) {
        println!("  {}", message.yellow());
    }
}

fn flush() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Capability;

    #[test]
    fn test_parse_answers() {
        assert_eq!(parse_reply("p"), Ok(OperatorReply::answer(OperatorAnswer::Pass)));
        assert_eq!(parse_reply(" FAIL "), Ok(OperatorReply::answer(OperatorAnswer::Fail)));
        assert_eq!(parse_reply("skip"), Ok(OperatorReply::answer(OperatorAnswer::Skip)));
        assert_eq!(parse_reply("a"), Ok(OperatorReply::answer(OperatorAnswer::Abort)));
    }

    #[test]
    fn test_parse_note() {
        assert_eq!(
            parse_reply("fail: green tint on frame"),
            Ok(OperatorReply::with_note(OperatorAnswer::Fail, "green tint on frame"))
        );
        assert_eq!(parse_reply("p:"), Ok(OperatorReply::answer(OperatorAnswer::Pass)));
    }

    #[test]
    fn test_parse_rerun() {
        assert_eq!(
            parse_reply("r stream-h264"),
            Ok(OperatorReply::Rerun("stream-h264".into()))
        );
        assert!(parse_reply("rerun").is_err());
        assert!(parse_reply("").is_err());
        assert!(parse_reply("maybe").is_err());
        assert!(parse_reply("pass now").is_err());
    }

    #[test]
    fn test_parse_review() {
        assert_eq!(parse_review(""), Ok(ReviewReply::Finish));
        assert_eq!(parse_review("done"), Ok(ReviewReply::Finish));
        assert_eq!(parse_review("abort"), Ok(ReviewReply::Abort));
        assert_eq!(parse_review("r upload-medium"), Ok(ReviewReply::Rerun("upload-medium".into())));
        assert!(parse_review("what").is_err());
    }

    #[tokio::test]
    async fn test_confirm_reprompts_on_bad_input() {
        let mut console = ConsoleOperator::new(&b"maybe\nfail: blurry\n"[..]);
        let step = Step::automated("s", "Stream", "video", Capability::Stream);
        let prompt = Prompt {
            step: &step,
            position: 1,
            total: 1,
            provisional: Some(Provisional::Pass),
            attempts: 1,
            evidence: Some("codec h264"),
            rerun: false,
        };

        let reply = console.confirm(&prompt).await.unwrap();
        assert_eq!(reply, OperatorReply::with_note(OperatorAnswer::Fail, "blurry"));
    }

    #[tokio::test]
    async fn test_closed_input_is_an_operator_error() {
        let mut console = ConsoleOperator::new(&b""[..]);
        let err = console.review(&[]).await.unwrap_err();
        assert!(matches!(err, Error::Operator(_)));
    }
}
