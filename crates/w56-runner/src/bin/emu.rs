//! `emu` — interactive machine front end.
//!
//! ```text
//! emu [binfile]
//! ```
//!
//! With `binfile`, the flat binary word stream is pre-loaded at address 0;
//! otherwise the machine starts blank, for hand-assembly via the `modify`
//! command. Once up, a line-oriented command loop presents a register/flag
//! dashboard and accepts commands to step, change run rate, inspect or
//! modify memory, reset, or exit.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;

use w56_core::{CpuState, FLG_FAULT, FLG_INTENA, FLG_IN_INT, FLG_SIGNED, FLG_ZERO, REG_FLG, REG_IP, REG_SP};
use w56_cpu::Cpu;
use w56_runner::{RunController, RunEvent, RunState, SharedPrinter};

fn usage(cmd: &str) {
    eprintln!("USAGE:\n\t{cmd} [binfile]");
}

fn run() -> Result<(), String> {
    let mut args = std::env::args();
    let cmd = args.next().unwrap_or_else(|| "emu".to_string());
    let rest: Vec<String> = args.collect();
    if rest.len() > 1 {
        usage(&cmd);
        return Err("too many arguments".to_string());
    }

    let image = match rest.first() {
        Some(path) => {
            let bytes = std::fs::read(path).map_err(|e| format!("{path}: {e}"))?;
            w56_asm::decode_binary(&bytes)
        }
        None => Vec::new(),
    };

    let cpu = Cpu::new();
    let printer = SharedPrinter::new(u32::from_be_bytes(*b"PRNT"));
    let ctrl = RunController::new(cpu, printer, &image);

    if rest.first().is_some() {
        println!("Loaded: {}", rest[0]);
    }
    println!("word56 interactive machine. Type 'help' for commands.");

    interactive_loop(&ctrl)
}

fn interactive_loop(ctrl: &RunController) -> Result<(), String> {
    let stdin = io::stdin();
    loop {
        drain_events(ctrl);
        print_dashboard(ctrl);
        print!("> ");
        io::stdout().flush().map_err(|e| e.to_string())?;

        let mut line = String::new();
        let bytes_read = stdin.lock().read_line(&mut line).map_err(|e| e.to_string())?;
        if bytes_read == 0 {
            println!();
            return Ok(());
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            continue;
        };

        match command {
            "step" | "s" => {
                ctrl.change_state(RunState::Step);
                std::thread::sleep(Duration::from_millis(20));
            }
            "run" | "r" => match tokens.get(1).copied() {
                Some("slow") => ctrl.change_state(RunState::Slow),
                Some("medium") => ctrl.change_state(RunState::Medium),
                Some("fast") => ctrl.change_state(RunState::Fast),
                Some("free") => ctrl.change_state(RunState::FreeRun),
                _ => println!("usage: run <slow|medium|fast|free>"),
            },
            "stop" => ctrl.change_state(RunState::Stopped),
            "view" | "v" => match tokens.get(1).and_then(|a| parse_addr(a)) {
                Some(addr) => {
                    ctrl.quiesce();
                    println!("0x{addr:08X}: 0x{:08X}", ctrl.read_mem(addr));
                }
                None => println!("usage: view <addr>"),
            },
            "modify" | "m" => {
                match (
                    tokens.get(1).and_then(|a| parse_addr(a)),
                    tokens.get(2).and_then(|v| parse_addr(v)),
                ) {
                    (Some(addr), Some(value)) => {
                        ctrl.quiesce();
                        ctrl.write_mem(addr, value);
                    }
                    _ => println!("usage: modify <addr> <value>"),
                }
            }
            "reg" => match (tokens.get(1).and_then(|r| parse_reg(r)), tokens.get(2).and_then(|v| parse_addr(v))) {
                (Some(idx), Some(value)) => {
                    ctrl.quiesce();
                    ctrl.write_reg(idx, value);
                }
                _ => println!("usage: reg <0-15> <value>"),
            },
            "reset" => {
                ctrl.quiesce();
                ctrl.load_program(&[]);
            }
            "help" | "h" | "?" => print_help(),
            "exit" | "quit" | "q" => return Ok(()),
            other => println!("unknown command: {other} (try 'help')"),
        }
    }
}

fn drain_events(ctrl: &RunController) {
    while let Some(event) = ctrl.try_recv_event() {
        if let RunEvent::PrinterLine(line) = event {
            println!("[printer] {line}");
        }
    }
}

fn parse_addr(tok: &str) -> Option<u32> {
    if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        tok.parse().ok()
    }
}

fn parse_reg(tok: &str) -> Option<usize> {
    let idx: usize = tok.parse().ok()?;
    (idx < w56_core::NUM_REGS).then_some(idx)
}

fn print_help() {
    println!("Commands:");
    println!("  step, s                 execute exactly one instruction");
    println!("  run, r <rate>           run continuously: slow, medium, fast, or free");
    println!("  stop                     stop continuous running");
    println!("  view, v <addr>          print one memory word");
    println!("  modify, m <addr> <val>  write one memory word");
    println!("  reg <0-15> <val>        write a register directly");
    println!("  reset                    reset to a blank machine");
    println!("  help, h, ?              show this message");
    println!("  exit, quit, q           leave the interactive loop");
}

fn print_dashboard(ctrl: &RunController) {
    let state: CpuState = ctrl.dump_state();
    println!();
    for row in 0..4 {
        let mut line = String::new();
        for col in 0..4 {
            let idx = row * 4 + col;
            line.push_str(&format!("R{idx:<2}=0x{:08X}  ", state.registers[idx]));
        }
        println!("{line}");
    }
    let flg = state.registers[REG_FLG];
    println!(
        "FLG=0x{:08X} [{}{}{}{}{}]  SP=0x{:08X}  IP=0x{:08X}  FHAP=0x{:08X}  IHAP=0x{:08X}",
        flg,
        if flg & FLG_ZERO != 0 { 'Z' } else { '-' },
        if flg & FLG_FAULT != 0 { 'F' } else { '-' },
        if flg & FLG_IN_INT != 0 { 'I' } else { '-' },
        if flg & FLG_INTENA != 0 { 'E' } else { '-' },
        if flg & FLG_SIGNED != 0 { 'S' } else { '-' },
        state.registers[REG_SP],
        state.registers[REG_IP],
        state.fhap_base,
        state.ihap_base,
    );
    println!("halted: {}", state.halted);
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
