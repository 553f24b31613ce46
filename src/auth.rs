use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

const PASSPHRASE_ENV: &str = "DIARIUM_PASSPHRASE";

/// Reads the passphrase (or raw key text) used to provision the key file.
pub fn read_secret(prompt: &str) -> Result<Zeroizing<String>> {
    //  Environment Variable
    //  DIARIUM_PASSPHRASE="long walk home" diarium keygen
    if let Some(secret) = secret_from_env() {
        return Ok(secret);
    }

    //  stdin (Pipeline)
    //  echo "long walk home" | diarium keygen
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if !buf.is_empty() {
            return Ok(buf);
        }
    }

    //  Interactive (TTY)
    if io::stdin().is_terminal() {
        let secret = Zeroizing::new(rpassword::prompt_password(prompt)?);
        if !secret.is_empty() {
            return Ok(secret);
        }
    }

    bail!("No passphrase provided")
}

/// Like [`read_secret`], but asks twice on a terminal or reads two lines
/// from a pipe.
pub fn read_secret_with_confirmation(prompt: &str) -> Result<Zeroizing<String>> {
    if let Some(secret) = secret_from_env() {
        return Ok(secret);
    }

    let (first, second) = if io::stdin().is_terminal() {
        (
            Zeroizing::new(rpassword::prompt_password(prompt)?),
            Zeroizing::new(rpassword::prompt_password("Confirm: ")?),
        )
    } else {
        let stdin = io::stdin();
        let mut handle = stdin.lock();

        let mut first = Zeroizing::new(String::new());
        let mut second = Zeroizing::new(String::new());
        handle.read_line(&mut first)?;
        handle.read_line(&mut second)?;

        trim_newline(&mut first);
        trim_newline(&mut second);
        (first, second)
    };

    if first.is_empty() {
        bail!("passphrase cannot be empty");
    }

    if first != second {
        bail!("passphrases do not match");
    }

    Ok(first)
}

fn secret_from_env() -> Option<Zeroizing<String>> {
    std::env::var(PASSPHRASE_ENV)
        .ok()
        .filter(|s| !s.is_empty())
        .map(Zeroizing::new)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
