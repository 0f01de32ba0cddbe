use std::{fs, path::PathBuf, process::ExitCode};

use clap::{Parser, ValueEnum};
use zunder::{ERROR_SENTINEL, Revision, Runtime, RuntimeCreateInfo, Strategy};

/// Run the built-in guest transform under a chosen bootstrap strategy and
/// report the output and the work units the bootstrap charged.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Bootstrap strategy
    #[arg(long, value_enum, default_value_t = StrategyArg::Selective)]
    strategy: StrategyArg,

    /// Input bytes as a hex string
    #[arg(long, conflicts_with = "input_file")]
    input: Option<String>,

    /// Read input bytes from a file
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Run every strategy on the same input and compare
    #[arg(long)]
    compare: bool,

    /// Model the runtime revision whose clock initializer misreports its
    /// first run
    #[arg(long)]
    defective_clock: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Full,
    FullOrdered,
    Selective,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Full => Strategy::Full,
            StrategyArg::FullOrdered => Strategy::FullPreInit,
            StrategyArg::Selective => Strategy::Selective,
        }
    }
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if text.len() % 2 != 0 {
        return Err("hex input must have an even number of digits".into());
    }
    let digit = |c: u8| -> Result<u8, String> {
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'a'..=b'f' => Ok(c - b'a' + 10),
            b'A'..=b'F' => Ok(c - b'A' + 10),
            _ => Err(format!("invalid hex digit {:?}", c as char)),
        }
    };
    text.as_bytes()
        .chunks_exact(2)
        .map(|pair| Ok(digit(pair[0])? << 4 | digit(pair[1])?))
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn load_input(args: &Args) -> Result<Vec<u8>, String> {
    if let Some(hex) = &args.input {
        return parse_hex(hex);
    }
    if let Some(path) = &args.input_file {
        return fs::read(path).map_err(|e| format!("{}: {e}", path.display()));
    }
    Ok(b"hello bootstrap".to_vec())
}

struct RunReport {
    output: Option<Vec<u8>>,
    work: u64,
}

fn run_one(strategy: Strategy, revision: Revision, input: &[u8]) -> RunReport {
    let mut runtime = Runtime::new(RuntimeCreateInfo {
        strategy,
        revision,
        ..Default::default()
    });
    let output = runtime.run(input).map(<[u8]>::to_vec).ok();
    RunReport {
        output,
        work: runtime.work(),
    }
}

fn describe(report: &RunReport) -> String {
    match &report.output {
        Some(bytes) if bytes.as_slice() == ERROR_SENTINEL => "guest error (sentinel)".into(),
        Some(bytes) => format!("{} bytes: {}", bytes.len(), to_hex(bytes)),
        None => "bootstrap failed".into(),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let input = match load_input(&args) {
        Ok(input) => input,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let revision = if args.defective_clock {
        Revision::NeutralClockInit
    } else {
        Revision::Clean
    };

    println!("input: {} bytes: {}", input.len(), to_hex(&input));

    if !args.compare {
        let report = run_one(args.strategy.into(), revision, &input);
        println!("{:?}: {}", Strategy::from(args.strategy), describe(&report));
        println!("work units: {}", report.work);
        return match report.output {
            Some(_) => ExitCode::SUCCESS,
            None => ExitCode::FAILURE,
        };
    }

    let strategies = [Strategy::Full, Strategy::FullPreInit, Strategy::Selective];
    let reports = strategies.map(|s| run_one(s, revision, &input));

    for (strategy, report) in strategies.iter().zip(&reports) {
        println!(
            "{:<12} work {:>6}   {}",
            format!("{strategy:?}"),
            report.work,
            describe(report)
        );
    }

    let outputs: Vec<&Vec<u8>> = reports.iter().filter_map(|r| r.output.as_ref()).collect();
    if outputs.windows(2).any(|w| w[0] != w[1]) {
        eprintln!("MISMATCH: strategies disagree on the output");
        return ExitCode::FAILURE;
    }
    println!("all completed strategies agree");
    ExitCode::SUCCESS
}
