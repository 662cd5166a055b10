//! `asm` — two-pass assembler CLI.
//!
//! ```text
//! asm [-b | -c] [-l] -o <outfile> <infile>...
//! ```
//!
//! Exactly one of `-b` (flat binary) or `-c` (card deck) is required. `-l`
//! additionally prints a disassembly listing to stdout.

use std::fs;
use std::process::ExitCode;

#[derive(PartialEq, Eq)]
enum OutputKind {
    Binary,
    CardDeck,
}

fn usage(cmd: &str) {
    eprintln!("USAGE:\n\t{cmd} [-b | -c] [-l] -o <outfile> <infile>...");
    eprintln!("  -b    write a flat binary word stream (required unless -c is given)");
    eprintln!("  -c    write a card-deck text container instead");
    eprintln!("  -l    print a disassembly listing to stdout");
}

fn run() -> Result<(), String> {
    let mut args = std::env::args();
    let cmd = args.next().unwrap_or_else(|| "asm".to_string());

    let mut kind: Option<OutputKind> = None;
    let mut listing = false;
    let mut outfile: Option<String> = None;
    let mut infiles: Vec<String> = Vec::new();

    let mut rest: Vec<String> = args.collect();
    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "-b" => kind = Some(OutputKind::Binary),
            "-c" => kind = Some(OutputKind::CardDeck),
            "-l" => listing = true,
            "-o" => {
                i += 1;
                if i >= rest.len() {
                    usage(&cmd);
                    return Err("-o requires an argument".to_string());
                }
                outfile = Some(rest[i].clone());
            }
            other => infiles.push(other.to_string()),
        }
        i += 1;
    }
    rest.clear();

    let Some(kind) = kind else {
        usage(&cmd);
        return Err("exactly one of -b or -c is required".to_string());
    };
    let Some(outfile) = outfile else {
        usage(&cmd);
        return Err("no output file given".to_string());
    };
    if infiles.is_empty() {
        usage(&cmd);
        return Err("no input files given".to_string());
    }

    let mut inputs = Vec::with_capacity(infiles.len());
    for path in &infiles {
        let contents = fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
        inputs.push((path.clone(), contents));
    }

    let segments = w56_asm::assemble(&inputs, 0).map_err(|e| {
        let _ = fs::remove_file(&outfile);
        e.to_string()
    })?;

    if listing {
        print!("{}", w56_asm::listing(&segments));
    }

    let bytes = match kind {
        OutputKind::Binary => {
            let (bytes, warning) = w56_asm::encode_binary(&segments);
            if let Some(warning) = warning {
                eprintln!("warning: {warning}");
            }
            bytes
        }
        OutputKind::CardDeck => w56_asm::encode_card_deck(&segments).into_bytes(),
    };
    fs::write(&outfile, bytes).map_err(|e| format!("{outfile}: {e}"))?;
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("Fatal: {msg}");
            ExitCode::FAILURE
        }
    }
}
