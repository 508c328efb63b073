//! Key password input
//!
//! `TORMONOL_KEY_PASSWORD` wins when set. Otherwise the password is read from the
//! terminal with echo off, or as one line when stdin is not a terminal.

use anyhow::{bail, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, BufRead, IsTerminal, Write};

pub const PASSWORD_ENV: &str = "TORMONOL_KEY_PASSWORD";

pub fn read_password(prompt: &str) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }

    eprint!("{}", prompt);
    io::stderr().flush()?;

    if !io::stdin().is_terminal() {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        return Ok(line.trim_end_matches(['\r', '\n']).to_string());
    }

    enable_raw_mode()?;
    let result = read_hidden();
    let _ = disable_raw_mode();
    eprintln!();
    result
}

/// Prompt twice and require both entries to match.
pub fn new_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    let first = read_password("New key password: ")?;
    let second = read_password("Repeat password: ")?;
    if first != second {
        bail!("passwords do not match");
    }
    Ok(first)
}

fn read_hidden() -> Result<String> {
    let mut password = String::new();
    loop {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) = event::read()?
        else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }
        match code {
            KeyCode::Enter => return Ok(password),
            KeyCode::Backspace => {
                password.pop();
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                bail!("cancelled")
            }
            KeyCode::Char(c) => password.push(c),
            _ => {}
        }
    }
}
