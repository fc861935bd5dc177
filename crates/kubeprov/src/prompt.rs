//! Interactive confirmation

use kubeprov_cloud::Confirm;
use std::io::{self, BufRead, Write};

/// Asks on the terminal; an empty answer means yes
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str) -> bool {
        let stdin = io::stdin();
        query_yes_no(question, &mut stdin.lock(), &mut io::stdout())
    }
}

/// Ask until the answer is recognizable. End of input counts as no.
pub fn query_yes_no<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> bool {
    loop {
        let _ = write!(output, "{} [Y/n] ", question);
        let _ = output.flush();

        let mut answer = String::new();
        match input.read_line(&mut answer) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }

        match answer.trim().to_lowercase().as_str() {
            "" | "y" | "yes" => return true,
            "n" | "no" => return false,
            _ => {
                let _ = writeln!(output, "Please respond with 'yes' or 'no' (or 'y' or 'n').");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ask(answers: &str) -> (bool, String) {
        let mut output = Vec::new();
        let result = query_yes_no("Create 3 instances on aws ?", &mut Cursor::new(answers), &mut output);
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_default_is_yes() {
        assert!(ask("\n").0);
    }

    #[test]
    fn test_explicit_answers() {
        assert!(ask("YES\n").0);
        assert!(!ask("n\n").0);
    }

    #[test]
    fn test_reprompts_on_garbage() {
        let (result, output) = ask("maybe\nno\n");
        assert!(!result);
        assert!(output.contains("Please respond"));
        assert_eq!(output.matches("[Y/n]").count(), 2);
    }

    #[test]
    fn test_end_of_input_declines() {
        assert!(!ask("").0);
    }
}
