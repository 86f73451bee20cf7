use std::io::Write;

use clap::{Parser, Subcommand};
use salesflow::utils::LoggingConfig;
use salesflow::{ChatReply, ChatRequest, ChatService, Settings};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "salesflow", version, about = "Multi-agent sales assistant", author)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session; one line per turn, `exit` to quit.
    Chat,
    /// Send a single message and print the reply.
    Ask {
        message: String,
        #[arg(long)]
        conversation: Option<String>,
        /// Print the full reply as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List registered agents.
    Agents,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    LoggingConfig::init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let service = ChatService::from_settings(&settings)?;

    match cli.command {
        Command::Chat => handle_chat(&service).await?,
        Command::Ask {
            message,
            conversation,
            json,
        } => handle_ask(&service, message, conversation, json).await?,
        Command::Agents => handle_agents(&service)?,
    }
    Ok(())
}

async fn handle_chat(service: &ChatService) -> anyhow::Result<()> {
    let mut session = service.session();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        if !line.is_empty() {
            match session.send(line).await {
                Ok(reply) => print_reply(&reply),
                Err(err) => eprintln!("error: {err}"),
            }
        }
        prompt()?;
    }
    if let Some(conversation_id) = session.conversation_id() {
        println!("conversation: {conversation_id}");
    }
    Ok(())
}

fn prompt() -> anyhow::Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

async fn handle_ask(
    service: &ChatService,
    message: String,
    conversation: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let request = ChatRequest {
        message,
        conversation_id: conversation,
    };
    let reply = service.handle(request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        print_reply(&reply);
        println!("conversation: {}", reply.conversation_id);
    }
    Ok(())
}

fn handle_agents(service: &ChatService) -> anyhow::Result<()> {
    let status = service.status();
    for agent in &status.agents {
        println!("{:<32} {}", agent.name, agent.framework);
    }
    println!("{} agents", status.agents.len());
    Ok(())
}

fn print_reply(reply: &ChatReply) {
    println!("{}\n", reply.message);
    if !reply.agent_activity.sub_agents_invoked.is_empty() {
        println!("[agents: {}]", reply.agent_activity.sub_agents_invoked.join(", "));
    }
}
