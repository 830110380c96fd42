//! mistack CLI - Inspect, slice, and merge raw multi-image stack files.

use std::path::PathBuf;
use std::process;

use mistack::{FrameRange, MergeInput, MultiImageStore, merge_stacks};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "info" => cmd_info(&args[2..]),
        "export" => cmd_export(&args[2..]),
        "merge" => cmd_merge(&args[2..]),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <command> [args]");
    eprintln!();
    eprintln!("Inspect, slice, and merge raw multi-image stack files.");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  info <metadata.json>");
    eprintln!("      Print the stack described by a metadata file.");
    eprintln!("  export <metadata.json> <output.raw> <output-metadata.json> [start [end [step]]]");
    eprintln!("      Copy a frame range into a new stack file.");
    eprintln!("  merge <output.raw> <output-metadata.json> <input-metadata.json>...");
    eprintln!("      Concatenate stacks along the frame axis.");
}

fn cmd_info(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let [metadata_path] = args else {
        return Err("info expects: <metadata.json>".into());
    };
    let store = MultiImageStore::from_metadata_path(&PathBuf::from(metadata_path))?;
    println!("{store}");
    Ok(())
}

fn cmd_export(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.len() < 3 || args.len() > 6 {
        return Err(
            "export expects: <metadata.json> <output.raw> <output-metadata.json> [start [end [step]]]"
                .into(),
        );
    }
    let mut store = MultiImageStore::from_metadata_path(&PathBuf::from(&args[0]))?;

    let start: usize = match args.get(3) {
        Some(s) => s.parse()?,
        None => 0,
    };
    let end: Option<usize> = match args.get(4) {
        Some(s) => Some(s.parse()?),
        None => None,
    };
    let step: usize = match args.get(5) {
        Some(s) => s.parse()?,
        None => 1,
    };
    let range = FrameRange::with_step(start, end, step);

    store.export(
        &PathBuf::from(&args[1]),
        &PathBuf::from(&args[2]),
        Some(&range),
        None,
    )?;
    println!("exported to {}", args[1]);
    Ok(())
}

fn cmd_merge(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.len() < 3 {
        return Err(
            "merge expects: <output.raw> <output-metadata.json> <input-metadata.json>...".into(),
        );
    }
    // Each input's stack path comes from its metadata's filename key.
    let mut inputs: Vec<MergeInput> = Vec::with_capacity(args.len() - 2);
    for meta_path in &args[2..] {
        let store = MultiImageStore::from_metadata_path(&PathBuf::from(meta_path))?;
        inputs.push(MergeInput::Store(store));
    }

    let merged = merge_stacks(
        &PathBuf::from(&args[0]),
        inputs,
        Some(&PathBuf::from(&args[1])),
        0,
        None,
    )?;
    println!("merged {} frames into {}", merged.frame_count(), args[0]);
    Ok(())
}
