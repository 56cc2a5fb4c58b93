//! Monitor the microphone, with or without noise suppression
//!
//! Run with: cargo run --example monitor
//!
//! Use headphones, or the speakers will feed back into the microphone.
//! Set RUST_LOG=stille=debug to watch the graph being rewired.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use stille::{CpalHost, Mode, Session, SessionEvent};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let host = CpalHost::new();
    println!(
        "Input:  {}",
        host.default_input_name().unwrap_or_else(|| "(none)".into())
    );
    println!(
        "Output: {}",
        host.default_output_name().unwrap_or_else(|| "(none)".into())
    );

    let mut session = Session::new(host).on_event(Arc::new(|event: SessionEvent| match event {
        SessionEvent::Started { route, sample_rate, .. } => {
            println!("-> {:?} @ {}Hz", route, sample_rate)
        }
        SessionEvent::Fallback { reason } => println!("-> suppression unavailable: {:?}", reason),
        SessionEvent::Stopped => println!("-> stopped"),
        SessionEvent::Error { message } => println!("-> error: {}", message),
    }));

    println!("\n[s] start with suppression  [r] start raw  [x] stop  [q] quit");
    prompt();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        match line.trim() {
            "s" => {
                session.start(Mode::Suppressed);
            }
            "r" => {
                session.start(Mode::Raw);
            }
            "x" => session.stop(),
            "q" => break,
            "" => {}
            other => println!("unknown command '{}'", other),
        }
        prompt();
    }

    session.stop();
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}
