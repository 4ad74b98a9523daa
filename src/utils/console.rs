//! Console helpers for the walkthrough output
//!
//! Progress lines go to stdout; the exit pause waits for a single key
//! when stdin is an interactive terminal.

use crate::error::Result;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal;
use std::io::{IsTerminal, Write};
use tracing::{debug, info};

/// Prompt printed before the program waits to exit
pub const PRESS_ANY_KEY: &str = "按任意键退出";

/// Print a numbered walkthrough step
pub fn step(number: u8, message: &str) {
    info!(step = number, "{}", message);
    println!("{number}. {message}");
}

/// Wait for any key press. Does nothing when stdin is not a terminal.
pub fn wait_for_keypress() -> Result<()> {
    if !std::io::stdin().is_terminal() {
        debug!("stdin is not a terminal; not waiting for a key press");
        return Ok(());
    }

    std::io::stdout().flush()?;
    terminal::enable_raw_mode()?;
    let outcome = read_one_key();
    terminal::disable_raw_mode()?;
    println!();
    outcome
}

fn read_one_key() -> Result<()> {
    loop {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                return Ok(());
            }
        }
    }
}
