// src/cli/session.rs — Interactive avatar session REPL

use std::future::Future;
use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::answer;
use crate::infra::config::Config;
use crate::provider::did::DidClient;
use crate::session::sinks::TracingSinks;
use crate::session::transport::PeerConnectionFactory;
use crate::session::{SessionManager, SessionSettings, TalkRequest};

/// What one line of input asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Quit,
    Status,
    Reconnect,
    Help,
    Unknown(&'a str),
    Empty,
    Say(&'a str),
}

pub fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    match trimmed {
        "" => Input::Empty,
        "quit" | "exit" | "/quit" => Input::Quit,
        "/status" => Input::Status,
        "/reconnect" => Input::Reconnect,
        "/help" => Input::Help,
        cmd if cmd.starts_with('/') => Input::Unknown(cmd),
        text => Input::Say(text),
    }
}

#[cfg(feature = "webrtc")]
fn transport() -> anyhow::Result<Arc<dyn PeerConnectionFactory>> {
    Ok(Arc::new(crate::session::webrtc::WebRtcFactory))
}

#[cfg(not(feature = "webrtc"))]
fn transport() -> anyhow::Result<Arc<dyn PeerConnectionFactory>> {
    anyhow::bail!("no peer-connection transport compiled in; rebuild with `--features webrtc`")
}

pub async fn run_session(config: &Config, voice: Option<String>) -> anyhow::Result<()> {
    config.validate()?;
    let factory = transport()?;

    let manager = SessionManager::new(
        Arc::new(DidClient::from_config(config)),
        factory,
        answer::from_config(config)?,
        Arc::new(TracingSinks),
        SessionSettings::from_config(config),
    );

    eprintln!("talkstream v{} | answers: {}", env!("CARGO_PKG_VERSION"), config.answer_source);
    eprintln!("Connecting...");
    manager.connect().await?;
    eprintln!("Connected. Type a question, /help for commands.\n");

    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    loop {
        prompt();
        let Some(line) = next_input(&mut lines, tokio::signal::ctrl_c()).await else {
            break;
        };

        match parse_input(&line) {
            Input::Quit => break,
            Input::Empty => continue,
            Input::Status => {
                eprintln!("  Phase: {:?}", manager.phase());
                eprintln!("  {}", manager.status());
                if let Some(id) = manager.stream_id() {
                    eprintln!("  Stream: {}", id);
                }
            }
            Input::Reconnect => match manager.connect().await {
                Ok(()) => eprintln!("  Connected."),
                Err(e) => eprintln!("[error] {}", e),
            },
            Input::Help => {
                eprintln!("Slash commands:");
                eprintln!("  /status            Show connection status");
                eprintln!("  /reconnect         Reconnect if the stream dropped");
                eprintln!("  /help              Show this help");
                eprintln!("  /quit, quit, exit  End session");
            }
            Input::Unknown(cmd) => {
                eprintln!("Unknown command: {}. Type /help for commands.", cmd);
            }
            Input::Say(text) => {
                let mut request = TalkRequest::new(text);
                if let Some(ref v) = voice {
                    request = request.with_voice(v.clone());
                }
                match manager.talk(request).await {
                    Ok(outcome) => println!("{}", outcome.answer),
                    Err(e) => eprintln!("[error] {}", e),
                }
            }
        }
    }

    eprintln!("Disconnecting...");
    manager.disconnect().await;
    Ok(())
}

fn prompt() {
    use std::io::Write;

    print!("> ");
    std::io::stdout().flush().ok();
}

/// Read lines on a plain thread. A runtime never waits for it on shutdown,
/// so a read still pending at Ctrl-C cannot keep the process alive.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Next input line, or `None` on EOF or once `interrupt` completes.
pub async fn next_input<F>(lines: &mut mpsc::UnboundedReceiver<String>, interrupt: F) -> Option<String>
where
    F: Future,
{
    tokio::select! {
        line = lines.recv() => line,
        _ = interrupt => None,
    }
}
