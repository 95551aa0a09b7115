use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use bruttus_agents::{Conversation, IgnoreReason, ProviderStatus, SubmitOutcome};
use bruttus_common::Message;
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Read lines from stdin and feed them to `conversation` until `/quit` or EOF.
pub async fn run(conversation: &Conversation) -> Result<()> {
    let mut printed = print_new(conversation, 0);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "/quit" | "/exit" => break,
            "/status" => {
                print_statuses(conversation);
                continue;
            }
            _ => {}
        }

        println!("...");
        match conversation.submit(&line).await {
            SubmitOutcome::Replied(_) => printed = print_new(conversation, printed),
            SubmitOutcome::Ignored(IgnoreReason::EmptyInput) => {}
            SubmitOutcome::Ignored(IgnoreReason::Busy) => {
                println!("(aguarde a resposta anterior)");
            }
        }
    }

    Ok(())
}

fn print_new(conversation: &Conversation, already_printed: usize) -> usize {
    let transcript = conversation.transcript();
    for message in transcript.iter().skip(already_printed) {
        println!("{}", render_message(message));
    }
    transcript.len()
}

fn print_statuses(conversation: &Conversation) {
    println!("{}", conversation.status_line());
    for (id, status) in conversation.provider_statuses() {
        if let Some(error) = &status.error {
            println!("  {id}: {error}");
        }
    }
    let dispatcher = conversation.dispatcher();
    println!("{}", queue_line(dispatcher.pending(), dispatcher.cooldown()));
}

/// Dispatcher backlog as shown by `/status`.
pub fn queue_line(pending: usize, cooldown: Duration) -> String {
    format!(
        "fila: {pending} chamada(s) aguardando, intervalo {} ms",
        cooldown.as_millis()
    )
}

/// `[HH:MM] <sender>: <text>` in local time.
pub fn render_message(message: &Message) -> String {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M");
    format!("[{time}] {}: {}", message.sender, message.text)
}

/// One line of `bruttus status` output.
pub fn status_entry(display_name: &str, status: &ProviderStatus) -> String {
    match (&status.error, status.available) {
        (_, true) => format!("{display_name}: ✅"),
        (Some(error), false) => format!("{display_name}: ❌ ({error})"),
        (None, false) => format!("{display_name}: ❌"),
    }
}
