//! dex-merger CLI: combine two `.dex` files into one.
//!
//! Usage:
//!   dex-merger <out.dex> <a.dex> <b.dex>
//!
//! Collision policy, removal set, and compaction threshold are not exposed
//! as flags here; the CLI path always runs with `MergeOptions::default()`.

use std::path::Path;

use dexmerge::{merge_and_write, DexFile, MergeOptions};

fn print_usage() {
    eprintln!("Usage: dex-merger <out.dex> <a.dex> <b.dex>");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <out.dex>  Path the merged DEX file is written to");
    eprintln!("  <a.dex>    First input DEX file");
    eprintln!("  <b.dex>    Second input DEX file");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("dex-merger {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("dex-merger {}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Combines two Dalvik Executable (.dex) files into one well-formed,");
        println!("re-indexed .dex file.");
        println!();
        print_usage();
        std::process::exit(0);
    }

    if args.len() != 4 {
        print_usage();
        std::process::exit(1);
    }

    tracing_subscriber::fmt().init();

    let out_path = &args[1];
    let a_path = &args[2];
    let b_path = &args[3];

    if let Err(e) = run(out_path, a_path, b_path) {
        eprintln!("dex-merger: {}", e);
        std::process::exit(1);
    }
}

fn run(out_path: &str, a_path: &str, b_path: &str) -> Result<(), String> {
    let a = read_dex(a_path)?;
    let b = read_dex(b_path)?;

    let options = MergeOptions::default();
    let merged = merge_and_write(&a, &b, &options).map_err(|e| e.to_string())?;

    std::fs::write(out_path, &merged)
        .map_err(|e| format!("failed to write {}: {}", out_path, e))?;

    eprintln!(
        "[dex-merger] wrote {} ({} bytes) from {} + {}",
        out_path,
        merged.len(),
        a_path,
        b_path
    );
    Ok(())
}

fn read_dex(path: &str) -> Result<DexFile, String> {
    let bytes = std::fs::read(Path::new(path))
        .map_err(|e| format!("failed to read {}: {}", path, e))?;
    DexFile::read_from_bytes(&bytes).map_err(|e| format!("{}: {}", path, e))
}
