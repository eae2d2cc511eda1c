//! Command-line front-end: one-shot restore and interactive session

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::RestoreSession;
use crate::device::{DeviceWatcher, EndpointSet, PortState};
use crate::payload::{DataKind, Model};
use crate::transfer::TransferStatus;

const SETUP_STEPS: &[&str] = &[
    "Connect MIDI OUT from your computer's MIDI interface to MIDI IN on the M1",
    "Power on your M1",
    "On the M1, press GLOBAL",
    "Press PAGE+ until you see \"MIDI DUMP\"",
    "Use the slider to select \"RECEIVE\" mode",
    "Select your MIDI interface and M1 model below",
    "Choose Factory Sounds or Demo Sequences to restore",
    "Send to the M1 and wait for the transfer to complete",
    "The M1 will automatically restart when the transfer is complete",
];

const COMMANDS: &[(&str, &str)] = &[
    ("ports", "List MIDI outputs"),
    ("select <id|index|name>", "Select the MIDI output"),
    ("model <m1|m1ex>", "Select your M1 model"),
    ("load <sounds|sequences>", "Load bundled factory data"),
    ("file <path>", "Load any SysEx file"),
    ("send", "Send the loaded data to the M1"),
    ("status", "Show the current selection and status"),
    ("help", "Show setup instructions and commands"),
    ("quit", "Exit"),
];

/// Interactive session command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ports,
    Select(String),
    Model(Model),
    Load(DataKind),
    File(PathBuf),
    Send,
    Status,
    Help,
    Quit,
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim();
        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line, ""),
        };

        let require_arg = |usage: &str| {
            if arg.is_empty() {
                Err(format!("Usage: {}", usage))
            } else {
                Ok(arg)
            }
        };

        match verb.to_lowercase().as_str() {
            "" => Ok(Command::Empty),
            "ports" | "list" => Ok(Command::Ports),
            "select" | "port" => Ok(Command::Select(require_arg("select <id|index|name>")?.to_string())),
            "model" => require_arg("model <m1|m1ex>")?.parse().map(Command::Model),
            "load" => require_arg("load <sounds|sequences>")?.parse().map(Command::Load),
            "file" => Ok(Command::File(PathBuf::from(require_arg("file <path>")?))),
            "send" => Ok(Command::Send),
            "status" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("Unknown command '{}'. Type 'help' for the list.", other)),
        }
    }
}

/// Print the setup instructions
pub fn print_instructions() {
    println!("\n{}", "Setup Instructions:".bold().cyan());
    for (i, step) in SETUP_STEPS.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
    println!(
        "\n{}",
        "Important: Ensure your M1 has a working battery installed before proceeding"
            .yellow()
            .bold()
    );
}

fn print_help() {
    print_instructions();
    println!("\n{}", "Commands:".bold());
    for (usage, description) in COMMANDS {
        println!("  {:<26} {}", usage.green(), description);
    }
    println!();
}

/// Print the available outputs
pub fn print_ports(endpoints: &EndpointSet, selected: Option<&str>) {
    println!("\n{}", "=== MIDI Output Ports ===".bold());
    if endpoints.is_empty() {
        println!("  {}", "No MIDI devices detected. Please connect a MIDI interface.".dimmed());
    }
    for (i, endpoint) in endpoints.iter().enumerate() {
        let marker = if Some(endpoint.id.as_str()) == selected { "*" } else { " " };
        println!("{} {}: {} {}", marker, i, endpoint, format!("[{}]", endpoint.id).dimmed());
    }
    println!();
}

/// Print a status transition as a titled alert line
pub fn print_status(status: &TransferStatus) {
    let title = match status {
        TransferStatus::Success => status.title().green().bold(),
        TransferStatus::Error(_) => status.title().red().bold(),
        TransferStatus::Uploading => status.title().yellow().bold(),
        _ => status.title().cyan().bold(),
    };
    println!("{} {}", title, status.description());
}

fn print_summary(session: &RestoreSession) {
    for (label, value) in session.summary() {
        println!("  {:<8} {}", format!("{}:", label).bold(), value);
    }
}

/// Source of the payload in one-shot mode
#[derive(Debug, Clone)]
pub enum PayloadChoice {
    Bundled(Model, DataKind),
    File(PathBuf),
}

/// Load, send, report. Fails when any step fails.
pub async fn run_once(session: &mut RestoreSession, port: &str, choice: PayloadChoice) -> Result<()> {
    session.select_endpoint(port)?;

    match choice {
        PayloadChoice::Bundled(model, kind) => {
            session.select_model(model);
            session.load_bundled(kind).await?;
        }
        PayloadChoice::File(path) => {
            session.load_file(&path).await?;
        }
    }
    print_summary(session);

    let report = send_with_interrupt(session).await?;
    println!("{} {}", "Sent".green().bold(), report);
    Ok(())
}

/// Run a send, dropping it on Ctrl+C
async fn send_with_interrupt(
    session: &RestoreSession,
) -> crate::error::Result<crate::transfer::TransferReport> {
    tokio::select! {
        result = session.send() => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Ctrl+C received, aborting transfer");
            Err(crate::error::RestoreError::Interrupted {
                offset: session.engine().session().cursor,
            })
        }
    }
}

enum ReadEvent {
    Line(String),
    Interrupted,
    Eof,
}

/// rustyline on its own thread; reads one line per `prompt()`
struct LineReader {
    lines: mpsc::Receiver<ReadEvent>,
    ready: std::sync::mpsc::Sender<()>,
}

impl LineReader {
    fn spawn() -> Self {
        let (line_tx, lines) = mpsc::channel(1);
        let (ready, ready_rx) = std::sync::mpsc::channel::<()>();

        std::thread::spawn(move || {
            let mut rl = match DefaultEditor::new() {
                Ok(rl) => rl,
                Err(e) => {
                    warn!("Failed to start line editor: {}", e);
                    let _ = line_tx.blocking_send(ReadEvent::Eof);
                    return;
                }
            };

            while ready_rx.recv().is_ok() {
                let event = match rl.readline("m1> ") {
                    Ok(line) => {
                        if !line.trim().is_empty() {
                            let _ = rl.add_history_entry(line.as_str());
                        }
                        ReadEvent::Line(line)
                    }
                    Err(ReadlineError::Interrupted) => ReadEvent::Interrupted,
                    Err(ReadlineError::Eof) => ReadEvent::Eof,
                    Err(e) => {
                        warn!("Readline error: {}", e);
                        ReadEvent::Eof
                    }
                };
                if line_tx.blocking_send(event).is_err() {
                    break;
                }
            }
            debug!("Line reader stopped");
        });

        Self { lines, ready }
    }

    fn prompt(&self) {
        let _ = self.ready.send(());
    }

    async fn next(&mut self) -> Option<ReadEvent> {
        self.lines.recv().await
    }
}

/// Interactive session until `quit`, Ctrl+C or EOF
pub async fn run_repl(mut session: RestoreSession, mut watcher: DeviceWatcher) -> Result<()> {
    println!("\n{}", "=== Korg M1 Factory Preset Updater ===".bold().cyan());
    print_instructions();
    println!("\nType {} for commands.", "help".green());

    session
        .engine()
        .subscribe_status(Arc::new(|status: &TransferStatus| print_status(status)));

    print_ports(session.endpoints(), None);
    print_status(&session.engine().status());

    let mut reader = LineReader::spawn();
    reader.prompt();

    loop {
        tokio::select! {
            event = reader.next() => {
                let line = match event {
                    Some(ReadEvent::Line(line)) => line,
                    Some(ReadEvent::Interrupted) | Some(ReadEvent::Eof) | None => break,
                };

                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => execute(&mut session, command).await,
                    Err(message) => println!("{}", message.red()),
                }
                reader.prompt();
            }

            Some(change) = watcher.next_change() => {
                for endpoint in change.added.iter().chain(&change.removed) {
                    let label = format!("MIDI port {}:", endpoint.state);
                    let label = match endpoint.state {
                        PortState::Connected => label.green(),
                        PortState::Disconnected => label.yellow(),
                    };
                    println!("{} {}", label, endpoint);
                }
                if let Some(lost) = session.apply_device_change(change) {
                    println!(
                        "{}",
                        format!("Selected output '{}' went away; please select a device again.", lost.name)
                            .red()
                    );
                }
            }
        }
    }

    Ok(())
}

async fn execute(session: &mut RestoreSession, command: Command) {
    let result: crate::error::Result<()> = match command {
        Command::Ports => {
            print_ports(session.endpoints(), session.selected().map(|e| e.id.as_str()));
            Ok(())
        }
        Command::Select(query) => session.select_endpoint(&query).map(|endpoint| {
            println!("Selected {}", endpoint.to_string().bold());
        }),
        Command::Model(model) => {
            session.select_model(model);
            println!("Model: {}", model.display_name().bold());
            Ok(())
        }
        Command::Load(kind) => session.load_bundled(kind).await.map(|_| ()),
        Command::File(path) => session.load_file(&path).await.map(|_| ()),
        Command::Send => send_with_interrupt(session).await.map(|report| {
            println!("{} {}", "Sent".green().bold(), report);
        }),
        Command::Status => {
            print_summary(session);
            Ok(())
        }
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Quit | Command::Empty => Ok(()),
    };

    // Status-changing failures are already printed by the status callback
    if let Err(e) = result {
        if session.engine().status() != TransferStatus::Error(e.to_string()) {
            println!("{}", e.to_string().red());
        }
    }
}
