use mediatags::runtime::Runtime;
use mediatags::{Reader, Registry};
use tracing_subscriber::EnvFilter;

use std::process;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Use std::env for argument parsing
    let mut args = std::env::args().skip(1);
    let location = match args.next() {
        Some(val) => val,
        None => {
            eprintln!("Missing required argument: path-or-url");
            print_usage_and_exit();
        }
    };

    let mut tags: Option<Vec<String>> = None;
    while let Some(arg) = args.next() {
        if arg == "--tags" {
            match args.next() {
                Some(val) => tags = Some(val.split(',').map(|t| t.trim().to_string()).collect()),
                None => {
                    eprintln!("Expected a comma separated list after --tags");
                    print_usage_and_exit();
                }
            }
        } else {
            eprintln!("Unknown argument: {}", arg);
            print_usage_and_exit();
        }
    }

    let registry = Registry::with_defaults();
    let mut reader = Reader::new(&registry, location.as_str());
    if let Some(tags) = tags {
        reader = reader.tags_to_read(tags);
    }

    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            process::exit(1);
        }
    };
    let metadata = match rt.block_on(reader.read()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{}: {}", e.kind(), e);
            process::exit(1);
        }
    };

    println!("Format: {} {} ({} bytes)", metadata.format, metadata.version, metadata.size);
    if let Some(flags) = metadata.flags {
        println!("Flags: {:?}", flags);
    }
    println!();
    for (id, frames) in &metadata.frames {
        for frame in frames {
            if frame.description.is_empty() {
                println!("{:<8} {}", id, frame.data);
            } else {
                println!("{:<8} {} ({})", id, frame.data, frame.description);
            }
        }
    }
}

fn print_usage_and_exit() -> ! {
    eprintln!("Usage: demo <path-or-url> [--tags title,artist,...]");
    process::exit(1);
}
