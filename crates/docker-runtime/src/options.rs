//! Free-form docker option parsing and validation
//!
//! Executor configuration accepts extra `docker run` / `docker network
//! create` options as one string. Options the adapter itself manages are
//! reserved: letting a job smuggle in `--name` or `-d` would break container
//! tracking, cancellation and teardown, so those are rejected up front as
//! configuration errors.

use crate::{Error, Result};

/// `docker run` options managed by the adapter and therefore reserved
pub const RESERVED_RUN_OPTIONS: &[&str] = &[
    "-w",
    "--workdir",
    "-d",
    "--detach",
    "-a",
    "--attach",
    "-t",
    "--tty",
    "-i",
    "--interactive",
    "--rm",
    "--restart",
    "--name",
];

/// `docker network create` options managed by the adapter
pub const RESERVED_NETWORK_OPTIONS: &[&str] = &["-d", "--driver"];

/// Split an option string into tokens, honoring single and double quotes
///
/// `--label "a b" -e FOO='x y'` yields `["--label", "a b", "-e", "FOO=x y"]`.
/// Quotes are stripped; there is no escape processing beyond quoting, which
/// matches how the original executor tokenizes its option fields.
pub fn parse_quote_tokens(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Reject tokens that use a reserved option, in `--opt value` or `--opt=value` form
pub fn validate_options(tokens: &[String], reserved: &[&str]) -> Result<()> {
    for token in tokens {
        let name = token.split('=').next().unwrap_or(token);
        if reserved.contains(&name) {
            return Err(Error::Config(format!(
                "option '{name}' is reserved and managed by the executor"
            )));
        }
    }
    Ok(())
}
