//! kilotone headless session shell.
//!
//! Usage:
//!   kilotone                      local session
//!   kilotone --host [PORT]        host a collaborative session
//!   kilotone --connect HOST:PORT  join a collaborative session

use std::time::Duration;

use kilotone::app::Shell;
use kilotone::command::{CloneDepth, Command};
use kt_net::SessionOptions;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let mut options = SessionOptions::default();

    let host = args.iter().position(|a| a == "--host").map(|i| {
        if let Some(port) = args.get(i + 1).and_then(|s| s.parse().ok()) {
            options.host.port = port;
        }
    });
    let connect = args
        .iter()
        .position(|a| a == "--connect")
        .map(|i| match args.get(i + 1) {
            Some(addr) => options.connect.address = addr.clone(),
            None => {
                eprintln!("--connect requires HOST:PORT");
                std::process::exit(1);
            }
        });
    if host.is_some() && connect.is_some() {
        eprintln!("--host and --connect are mutually exclusive");
        std::process::exit(1);
    }

    let mut shell = Shell::new();

    if connect.is_some() {
        if let Err(e) = shell.join_session(&options) {
            eprintln!("failed to join session: {}", e);
            std::process::exit(1);
        }
        println!("joined session at {}", options.connect.address);
    } else {
        // A fresh song starts with one order.
        shell.perform(Command::order_add(None, 0, CloneDepth::Shallow));

        if host.is_some() {
            match shell.host_session(&options) {
                Ok(addr) => println!("hosting session on {}", addr),
                Err(e) => {
                    eprintln!("failed to host session: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    loop {
        shell.pump();
        std::thread::sleep(Duration::from_millis(16));
    }
}
