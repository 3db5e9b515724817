//! Live monitor for an X-Air console
//!
//! Subscribes to the main L/R fader and mute plus the first four input
//! channels, then prints every change and any sync trouble until Ctrl+C.
//!
//! Run with: cargo run -p xair-sync --example monitor -- 192.168.1.50:10024
//!
//! Set XAIR_LOG_MODE=development (or debug/json) to see the sync worker's logs.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use xair_sync::prelude::*;
use xair_sync::init_logging_from_env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    let console: SocketAddr = match std::env::args().nth(1) {
        Some(addr) => addr.parse()?,
        None => SyncConfig::default().console_addr,
    };

    println!("X-Air Monitor");
    println!("=============");
    println!("Console: {}", console);

    let mixer = MixerSync::connect(SyncConfig::for_console(console))?;

    let mut paths = vec![ParameterPath::main_fader(), ParameterPath::main_mute()];
    for channel in 1..=4 {
        paths.push(ParameterPath::channel_fader(channel)?);
        paths.push(ParameterPath::channel_mute(channel)?);
    }

    let mut handles = Vec::new();
    for path in &paths {
        handles.push(mixer.subscribe(*path, 2.0)?);
        mixer.query(*path)?;
    }
    println!("Subscribed to {} parameters (Ctrl+C to quit)\n", handles.len());

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let updates = mixer.updates();
    let events = mixer.events();

    while running.load(Ordering::SeqCst) {
        if let Some(update) = updates.recv_timeout(Duration::from_millis(500)) {
            if update.changed {
                println!("{:<18} {}", update.path.to_string(), describe(&update.value));
            }
        }

        for warning in events.warnings() {
            println!("[warning] {:?}", warning);
        }
    }

    println!("\nFinal state:");
    for path in &paths {
        match mixer.current_entry(path) {
            Some(entry) => println!(
                "  {:<18} {}{}",
                path.to_string(),
                describe(&entry.value),
                if entry.stale { " (stale)" } else { "" }
            ),
            None => println!("  {:<18} no data", path.to_string()),
        }
    }

    for handle in &handles {
        mixer.unsubscribe(handle)?;
    }
    mixer.shutdown()?;
    Ok(())
}

fn describe(value: &ParameterValue) -> String {
    match value {
        ParameterValue::Normalized(level) => match value.approx_db() {
            Some(db) if db.is_finite() => format!("{:.3} ({:+.1} dB)", level, db),
            _ => format!("{:.3} (-inf dB)", level),
        },
        ParameterValue::Boolean(on) => if *on { "on" } else { "muted" }.to_string(),
    }
}
