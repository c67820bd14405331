// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Drive a named mutex from the command line, one process per role.
//
// Usage:
//   demo_named_mutex hold    <name> <ms>    acquire, hold for <ms>, release
//   demo_named_mutex try     <name> [ms]    one non-blocking attempt
//   demo_named_mutex wait    <name> <ms>    blocking attempt with timeout
//   demo_named_mutex abandon <name>         acquire, then exit without releasing
//
// Each step prints one word on stdout: locked, released, acquired,
// abandoned, busy, timeout, failed. Diagnostics go to stderr (RUST_LOG).

use std::thread;
use std::time::Duration;

use winglet::{AcquireOutcome, NamedMutex};

fn usage() -> ! {
    eprintln!("usage: demo_named_mutex hold <name> <ms>");
    eprintln!("       demo_named_mutex try <name> [ms]");
    eprintln!("       demo_named_mutex wait <name> <ms>");
    eprintln!("       demo_named_mutex abandon <name>");
    std::process::exit(2);
}

fn parse_ms(arg: Option<&String>) -> Option<Duration> {
    arg.map(|s| match s.parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(_) => usage(),
    })
}

fn word(outcome: &AcquireOutcome, miss: &'static str) -> &'static str {
    match outcome {
        AcquireOutcome::Acquired => "acquired",
        AcquireOutcome::Abandoned => "abandoned",
        AcquireOutcome::TimedOut => miss,
        AcquireOutcome::Failed(_) => "failed",
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        usage();
    }
    if let Err(e) = winglet::logging::init_stderr() {
        eprintln!("{e}");
    }

    let mtx = match NamedMutex::new(&args[2]) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            println!("failed");
            std::process::exit(1);
        }
    };

    match args[1].as_str() {
        "hold" => {
            let hold = parse_ms(args.get(3)).unwrap_or_else(|| usage());
            let guard = mtx.lock();
            if !guard.acquired() {
                println!("failed");
                std::process::exit(1);
            }
            println!("locked");
            thread::sleep(hold);
            drop(guard);
            println!("released");
        }
        "try" => {
            let outcome = mtx.acquire_outcome(false, parse_ms(args.get(3)));
            println!("{}", word(&outcome, "busy"));
        }
        "wait" => {
            let timeout = parse_ms(args.get(3)).unwrap_or_else(|| usage());
            let outcome = mtx.acquire_outcome(true, Some(timeout));
            println!("{}", word(&outcome, "timeout"));
        }
        "abandon" => {
            if !mtx.acquire(true, None) {
                println!("failed");
                std::process::exit(1);
            }
            println!("locked");
            // exit() skips destructors: the lock is never released.
            std::process::exit(0);
        }
        other => {
            eprintln!("unknown mode: {other}");
            usage();
        }
    }
}
