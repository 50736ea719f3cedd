use std::{process::ExitCode, sync::atomic::AtomicBool, time::Instant};

use superscalar::{
    catalogue,
    config::CpuConfig,
    error::{HaltReason, SimError},
    out_of_order::OutOfOrder,
    state::SimStatus,
};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, SimError> {
    let start = Instant::now();
    let mut args = std::env::args().skip(1);

    let Some(path) = args.next() else {
        eprintln!("usage: superscalar <program.asm> [config.json]");
        eprintln!("       superscalar --catalogue");
        return Ok(ExitCode::from(2));
    };

    if path == "--catalogue" {
        let table = serde_json::to_string_pretty(&catalogue::catalogue())
            .map_err(std::io::Error::from)?;
        println!("{table}");
        return Ok(ExitCode::SUCCESS);
    }

    let config = match args.next() {
        Some(file) => CpuConfig::from_json(&std::fs::read_to_string(file)?)?,
        None => CpuConfig::default(),
    };

    let contents = std::fs::read_to_string(&path)?;
    let mut cpu = OutOfOrder::from_assembly(&contents, config)?;

    // SINGLE_STEP=1 prints the full state after every cycle and waits for enter.
    if std::env::var("SINGLE_STEP").is_ok() {
        while !cpu.step().is_terminal() {
            let state =
                serde_json::to_string_pretty(&cpu.snapshot()).map_err(std::io::Error::from)?;
            println!("{state}");
            std::io::stdin().read_line(&mut String::new())?;
        }
    } else {
        cpu.run_to_completion(&AtomicBool::new(false));
    }

    let status = cpu.status();
    if status == SimStatus::Halted {
        if let Some(reason) = cpu.halt_reason() {
            println!("    EXECUTION HALTED: {reason}");
            if let HaltReason::MemoryFault { pc, .. } = reason {
                if let Some(line) = cpu.program().source_line(*pc) {
                    println!("    at source line {line}");
                }
            }
        }
    } else {
        println!("    EXECUTION COMPLETED");
    }
    println!("    =====================");
    print!("{}", cpu.stats());
    println!(
        "  Simulator time elapsed: {:.2}s",
        start.elapsed().as_secs_f32()
    );

    Ok(match status {
        SimStatus::Halted => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}
