//! Interactive chat loop.
//!
//! Reads one line per turn from stdin, streams the answer to stdout and keeps
//! the conversation history between turns.  Ctrl+C while an answer is
//! streaming cancels that answer only; at the prompt it exits.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use codeloom_agent::{Message, ProviderClient, ProviderResponse};
use tracing::info;

use crate::helpers::{Interrupts, render_stream, request_scope, unavailable_result};

/// Upper bound on provider round trips for a single user line.
const MAX_TOOL_ROUNDS: usize = 8;

pub async fn cmd_chat(
    client: Arc<dyn ProviderClient>,
    timeout_secs: Option<u64>,
    interrupts: Interrupts,
) -> Result<()> {
    let model = client.model();
    println!();
    println!("  codeloom v{}", env!("CARGO_PKG_VERSION"));
    println!("  Model: {}", model.id);
    println!("  Type your request, or 'quit' to exit.");
    println!();

    let stdin = io::stdin();
    let mut line_buf = String::new();
    let mut history: Vec<Message> = Vec::new();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        line_buf.clear();
        match stdin.lock().read_line(&mut line_buf) {
            Ok(0) => {
                println!();
                info!("EOF received, exiting");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("  Error reading input: {e}");
                continue;
            }
        }

        let trimmed = line_buf.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            info!("user requested exit");
            break;
        }

        let mark = history.len();
        history.push(Message::user(trimmed));

        let scope = request_scope(timeout_secs);
        interrupts.arm(&scope);
        let outcome = run_turn(client.as_ref(), &mut history, &scope).await;
        interrupts.disarm();

        match outcome {
            Ok(()) => {
                println!();
                println!();
            }
            Err(e) if e.is_cancellation() => {
                eprintln!("\n  Cancelled: {e}");
                eprintln!();
                history.truncate(mark);
            }
            Err(e) => {
                eprintln!("\n  Error: {e}");
                eprintln!();
                history.truncate(mark);
            }
        }
    }

    Ok(())
}

/// Stream answers until the model stops asking for tools.
async fn run_turn(
    client: &dyn ProviderClient,
    history: &mut Vec<Message>,
    scope: &codeloom_agent::CancelScope,
) -> codeloom_agent::Result<()> {
    for round in 0..MAX_TOOL_ROUNDS {
        let events = client.stream(history.clone(), Vec::new(), scope.clone());
        let response = render_stream(events, &mut io::stdout(), &mut io::stderr()).await?;
        tracing::debug!(
            round,
            finish_reason = ?response.finish_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "turn finished"
        );
        if !record_response(history, response) {
            return Ok(());
        }
    }

    tracing::warn!(rounds = MAX_TOOL_ROUNDS, "tool round limit reached");
    Ok(())
}

/// Append `response` to the history.  Returns `true` when it requested
/// tools, in which case their (error) results are appended too and another
/// round is due.
fn record_response(history: &mut Vec<Message>, response: ProviderResponse) -> bool {
    if response.tool_calls.is_empty() {
        history.push(Message::assistant(response.content));
        return false;
    }

    let results = response.tool_calls.iter().map(unavailable_result).collect();
    history.push(Message::assistant_with_tool_calls(
        response.content,
        response.tool_calls,
    ));
    history.push(Message::tool_results(results));
    true
}
