use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use readmit_agent::{ConversationEngine, EngineState};
use readmit_core::config::{AppConfig, LoadOptions};

use super::{block_on, build_oracle, CommandResult};

/// Interactive slot-filling session on stdin/stdout.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), 2);
        }
    };
    let oracle = match build_oracle(&config) {
        Ok(oracle) => oracle,
        Err(error) => return CommandResult::failure("chat", "oracle_setup", error, 2),
    };

    let engine = ConversationEngine::new(oracle);
    match block_on(chat_session(&engine)) {
        Ok(Ok(())) => CommandResult::success("chat", "conversation complete"),
        Ok(Err(error)) => CommandResult::failure("chat", "io", format!("{error:#}"), 3),
        Err(error) => CommandResult::failure("chat", "runtime", error, 4),
    }
}

async fn chat_session(engine: &ConversationEngine) -> Result<()> {
    let mut state = EngineState::new();
    let mut printed = 0;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    print_new_messages(&state, &mut printed, &mut stdout)?;

    loop {
        let Some(placeholder) = state.input_placeholder() else {
            break;
        };
        write!(stdout, "{placeholder} ").context("failed to write prompt")?;
        stdout.flush().context("failed to flush stdout")?;

        let mut line = String::new();
        let read = stdin.lock().read_line(&mut line).context("failed to read stdin")?;
        if read == 0 {
            // EOF ends the session without a prediction.
            writeln!(stdout).context("failed to write newline")?;
            break;
        }

        engine.submit_turn(&mut state, line.trim_end_matches(['\r', '\n'])).await;
        print_new_messages(&state, &mut printed, &mut stdout)?;
    }

    Ok(())
}

fn print_new_messages(
    state: &EngineState,
    printed: &mut usize,
    stdout: &mut impl Write,
) -> Result<()> {
    for message in &state.transcript().messages()[*printed..] {
        match message.role {
            readmit_agent::Role::Bot => {
                writeln!(stdout, "{}", message.content).context("failed to write message")?;
            }
            // The user just typed it; echoing would duplicate the line.
            readmit_agent::Role::User => {}
        }
    }
    *printed = state.transcript().len();
    Ok(())
}
