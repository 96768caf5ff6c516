//! Line-oriented chat loop

use courier_agent::{AgentRegistry, CreateOptions};
use courier_core::Command;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
  <text>                      route the message to the best agent
  @<id> <text>                send to a specific agent
  /agents                     list agents
  /types                      list agent types
  /create <type> <id>         create an agent
  /cmd <id> <name> [json]     run an agent command (or /cmd <id> <json command>)
  /quit                       exit";

#[derive(Debug, PartialEq)]
enum Input {
    Routed(String),
    Direct { id: String, message: String },
    Agents,
    Types,
    Create { agent_type: String, id: String },
    Cmd { id: String, command: Command },
    Help,
    Quit,
    Invalid(String),
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(rest) = line.strip_prefix('@') {
        return Some(match rest.split_once(char::is_whitespace) {
            Some((id, message)) if !id.is_empty() && !message.trim().is_empty() => Input::Direct {
                id: id.to_string(),
                message: message.trim().to_string(),
            },
            _ => Input::Invalid("usage: @<id> <message>".into()),
        });
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Some(Input::Routed(line.to_string()));
    };
    let (head, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let mut parts = tail.split_whitespace();
    let input = match (!head.is_empty()).then_some(head) {
        Some("quit") | Some("exit") => Input::Quit,
        Some("agents") => Input::Agents,
        Some("types") => Input::Types,
        Some("help") => Input::Help,
        Some("create") => match (parts.next(), parts.next()) {
            (Some(agent_type), Some(id)) => Input::Create {
                agent_type: agent_type.to_string(),
                id: id.to_string(),
            },
            _ => Input::Invalid("usage: /create <type> <id>".into()),
        },
        Some("cmd") => match tail.trim().split_once(char::is_whitespace) {
            Some((id, text)) => match Command::parse(text) {
                Ok(command) => Input::Cmd {
                    id: id.to_string(),
                    command,
                },
                Err(e) => Input::Invalid(e.to_string()),
            },
            None => Input::Invalid("usage: /cmd <id> <name> [json]".into()),
        },
        Some(other) => Input::Invalid(format!("unknown command /{} (try /help)", other)),
        None => Input::Invalid("empty command (try /help)".into()),
    };
    Some(input)
}

pub async fn print_agents(registry: &AgentRegistry) {
    let agents = registry.list_active().await;
    if agents.is_empty() {
        println!("(no agents)");
        return;
    }
    for a in agents {
        let status = if a.is_active() { "active" } else { "inactive" };
        println!("{:<24} {:<12} {:<8} {}", a.id, a.kind.as_str(), status, a.name);
    }
}

pub async fn run(registry: &AgentRegistry) -> anyhow::Result<()> {
    println!("courier chat. /help for commands, /quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else { break };
        let Some(input) = parse_input(&line) else { continue };

        match input {
            Input::Quit => break,
            Input::Help => println!("{}", HELP),
            Input::Agents => print_agents(registry).await,
            Input::Types => {
                for t in registry.available_types() {
                    println!("{:<12} {}", t.id.as_str(), t.description);
                }
            }
            Input::Invalid(msg) => println!("{}", msg),
            Input::Routed(message) => match registry.process_with_routing(&message).await {
                Ok(routed) => println!("[{}] {}", routed.agent_id, routed.response),
                Err(e) => println!("error: {}", e),
            },
            Input::Direct { id, message } => match registry.dispatch_message(&id, &message).await {
                Ok(reply) => println!("[{}] {}", id, reply),
                Err(e) => println!("error: {}", e),
            },
            Input::Create { agent_type, id } => {
                match registry.create(&agent_type, &id, CreateOptions::default()).await {
                    Ok(_) => println!("created {}", id),
                    Err(e) => println!("error: {}", e),
                }
            }
            Input::Cmd { id, command } => match registry.dispatch_command(&id, &command).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => println!("error: {}", e),
            },
        }
    }
    Ok(())
}
