//! One-shot question: send a single user message and print the answer.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use codeloom_agent::{Message, ProviderClient};

use crate::helpers::{Interrupts, render_stream, request_scope};

pub async fn cmd_ask(
    client: Arc<dyn ProviderClient>,
    prompt: String,
    stream: bool,
    timeout_secs: Option<u64>,
    interrupts: Interrupts,
) -> Result<()> {
    let scope = request_scope(timeout_secs);
    let messages = vec![Message::user(prompt)];

    interrupts.arm(&scope);
    let outcome = if stream {
        let events = client.stream(messages, Vec::new(), scope);
        render_stream(events, &mut io::stdout(), &mut io::stderr()).await
    } else {
        let response = client.send(messages, Vec::new(), scope).await;
        if let Ok(response) = &response {
            print!("{}", response.content);
        }
        response
    };
    interrupts.disarm();

    let response = outcome.context("request failed")?;
    println!();

    tracing::debug!(
        finish_reason = ?response.finish_reason,
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        tool_calls = response.tool_calls.len(),
        "answer complete"
    );
    for call in &response.tool_calls {
        eprintln!("  [tool] {} requested but not executed", call.name);
    }
    Ok(())
}
