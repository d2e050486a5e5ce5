//! Interactive session: line commands in, observable changes out.

use std::error::Error;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use glasscam::{Coordinator, Observables, SourceCatalog, SourceId};

/// A parsed line command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineCommand {
    Capture,
    Refresh,
    Select(SourceId),
    List,
    Help,
    Quit,
}

impl LineCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        match (command, parts.next()) {
            ("c", None) => Ok(LineCommand::Capture),
            ("r", None) => Ok(LineCommand::Refresh),
            ("s", Some(id)) => Ok(LineCommand::Select(SourceId::from(id))),
            ("s", None) => Err("Usage: s <source id>".to_string()),
            ("l", None) => Ok(LineCommand::List),
            ("h" | "?", None) => Ok(LineCommand::Help),
            ("q", None) => Ok(LineCommand::Quit),
            _ => Err(format!("Unknown command '{}'. Type h for help.", line.trim())),
        }
    }
}

/// Set up the Ctrl+C handler, reporting through a watch channel.
fn setup_ctrlc_handler() -> Result<watch::Receiver<bool>, ctrlc::Error> {
    let (tx, rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = tx.send(true);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })?;
    Ok(rx)
}

fn print_help() {
    println!("Commands:");
    println!("  c          capture the live frame and describe it");
    println!("  r          refresh the source list");
    println!("  s <id>     switch to a source");
    println!("  l          list sources");
    println!("  q          quit");
}

fn print_catalog(catalog: &SourceCatalog, selected: Option<&SourceId>) {
    if catalog.is_empty() {
        println!("[sources] none");
        return;
    }
    println!("[sources]");
    for source in catalog {
        let marker = if selected == Some(&source.id) { ">" } else { " " };
        println!(" {} {:<24} {}", marker, source.id, source.label());
    }
}

/// Run until `q`, end of input or Ctrl+C.
pub async fn run(coordinator: Coordinator) -> Result<(), Box<dyn Error>> {
    let mut stop = setup_ctrlc_handler()?;
    let Observables {
        mut source_catalog,
        selected_source_id,
        mut session_state,
        mut last_analysis_outcome,
        mut last_error,
    } = coordinator.observables();

    print_help();
    // Failures are rendered from last_error below
    let _ = coordinator.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            Ok(()) = session_state.changed() => {
                println!("[camera] {}", *session_state.borrow_and_update());
            }
            Ok(()) = source_catalog.changed() => {
                let catalog = source_catalog.borrow_and_update().clone();
                print_catalog(&catalog, selected_source_id.borrow().as_ref());
            }
            Ok(()) = last_analysis_outcome.changed() => {
                if let Some(outcome) = &*last_analysis_outcome.borrow_and_update() {
                    println!("[analysis] {}", outcome);
                }
            }
            Ok(()) = last_error.changed() => {
                if let Some(err) = &*last_error.borrow_and_update() {
                    println!("[error] {}", err);
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match LineCommand::parse(&line) {
                    Ok(LineCommand::Quit) => break,
                    Ok(command) => dispatch(&coordinator, command),
                    Err(message) => println!("{}", message),
                },
                Ok(None) => break,
                Err(e) => {
                    log::error!("Failed to read stdin: {}", e);
                    break;
                }
            },
        }
    }

    coordinator.shutdown().await;
    Ok(())
}

/// Slow operations run in the background so input and hot-plug stay live.
fn dispatch(coordinator: &Coordinator, command: LineCommand) {
    match command {
        LineCommand::Capture => {
            if !coordinator.session_state().is_live() {
                println!("Camera is not live yet.");
                return;
            }
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let _ = coordinator.capture_and_analyze().await;
            });
        }
        LineCommand::Refresh => {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let _ = coordinator.refresh().await;
            });
        }
        LineCommand::Select(id) => {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let _ = coordinator.select_source(id).await;
            });
        }
        LineCommand::List => {
            print_catalog(&coordinator.catalog(), coordinator.selected_source().as_ref());
        }
        LineCommand::Help => print_help(),
        LineCommand::Quit => {}
    }
}
