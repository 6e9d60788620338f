use anyhow::Context;
use std::io::Write;
use storefront_client::{ChatOrchestrator, HttpChatTransport, TurnOutcome};
use storefront_models::{ConversationMessage, Role};
use storefront_observability::{init_tracing, TracingConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Where the assistant listens when `ASSISTANT_URL` is unset.
const DEFAULT_ASSISTANT_URL: &str = "http://127.0.0.1:3001";

/// Prints whatever the latest assistant message gained since the last call.
#[derive(Default)]
struct Printer {
    message_id: Option<String>,
    printed: usize,
}

impl Printer {
    fn render(&mut self, messages: &[ConversationMessage]) {
        let Some(last) = messages.last().filter(|m| m.role == Role::Assistant) else {
            return;
        };
        if self.message_id.as_deref() != Some(last.id.as_str()) {
            if self.printed > 0 {
                println!();
            }
            self.message_id = Some(last.id.clone());
            self.printed = 0;
        }
        if let Some(fresh) = last.content.get(self.printed..) {
            print!("{}", fresh);
            let _ = std::io::stdout().flush();
            self.printed = last.content.len();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing(TracingConfig::for_service("storefront-chat"));

    let base_url = std::env::var("ASSISTANT_URL").unwrap_or_else(|_| DEFAULT_ASSISTANT_URL.to_string());
    let transport = HttpChatTransport::new(&base_url).context("building HTTP client")?;
    let mut chat = ChatOrchestrator::new(transport);

    println!("Chatting with {} (/reset clears, Ctrl-D quits)", base_url);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else { break };

        match line.trim() {
            "" => continue,
            "/reset" => {
                chat.reset();
                continue;
            }
            _ => {}
        }

        let mut printer = Printer::default();
        let outcome = chat
            .send_with(&line, |messages| printer.render(messages))
            .await?;
        println!();

        match outcome {
            TurnOutcome::Finished => {
                for product in chat.latest_products().unwrap_or_default() {
                    println!("  * {}", product.summary().trim_start_matches("- "));
                }
            }
            TurnOutcome::Failed(e) => tracing::debug!(error = %e, "turn failed"),
        }
    }

    Ok(())
}
