//! Terminal prompter for interactive account entry.

use std::collections::HashMap;
use std::io::{BufRead, Write};

use uget::provider::error::PromptError;
use uget::provider::{Field, Prompter};

/// Asks questions on the controlling terminal. Sensitive fields are read
/// without echo.
pub struct TerminalPrompter {
    provider: String,
}

impl TerminalPrompter {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn get(&self, fields: &[Field]) -> Result<HashMap<String, String>, PromptError> {
        let stdin = std::io::stdin();
        let mut answers = HashMap::with_capacity(fields.len());
        for field in fields {
            if field.value.is_empty() {
                print!("[{}] {}: ", self.provider, field.display);
            } else {
                print!("[{}] {} [{}]: ", self.provider, field.display, field.value);
            }
            std::io::stdout().flush()?;

            let answer = if field.sensitive {
                rpassword::read_password()?
            } else {
                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    return Err(PromptError::Eof {
                        field: field.key.clone(),
                    });
                }
                line.trim_end_matches(['\r', '\n']).to_string()
            };
            let answer = if answer.is_empty() {
                field.value.clone()
            } else {
                answer
            };
            answers.insert(field.key.clone(), answer);
        }
        Ok(answers)
    }

    fn error(&self, display: &str) {
        eprintln!("[{}] error: {display}", self.provider);
    }

    fn success(&self) {
        println!("[{}] success.", self.provider);
    }
}

/// Numbered selection from a list, read from standard input. Returns the
/// chosen index.
pub fn select_from(items: &[String], prompt: &str) -> Result<usize, PromptError> {
    if items.is_empty() {
        return Err(PromptError::Invalid("nothing to select from".into()));
    }
    if items.len() == 1 {
        return Ok(0);
    }
    for (index, item) in items.iter().enumerate() {
        println!("  {}) {item}", index + 1);
    }
    let stdin = std::io::stdin();
    for _ in 0..3 {
        print!("{prompt} [1-{}]: ", items.len());
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Err(PromptError::Eof {
                field: "selection".into(),
            });
        }
        if let Ok(choice) = line.trim().parse::<usize>() {
            if (1..=items.len()).contains(&choice) {
                return Ok(choice - 1);
            }
        }
        eprintln!("invalid selection");
    }
    Err(PromptError::Invalid("too many invalid selections".into()))
}
