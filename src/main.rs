use anyhow::Error;
use clap::Parser;
use std::io::BufRead;
use std::io::Write;
use tracing_subscriber::EnvFilter;

mod calculator;
mod format;
mod keypad;
mod stack;

use calculator::{Calculator, DisplayConfig};
use format::MAX_PRECISION;
use keypad::{Key, OPERATOR_KEYS};

/// Keypad calculator that evaluates as you type.
///
/// Keys: 0-9 and `.` enter digits; `+ - * /` are operators; without a value
/// `-` starts a negative number, `/` (or `(`) opens a group and `*` (or `s`)
/// opens a square root; `=` or `)` executes; `c` or `<` deletes.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Keystrokes to type, e.g. "2-3*4=". Reads stdin line by line when omitted
    input: Vec<String>,

    /// Print the display after every keystroke
    #[arg(short, long)]
    trace: bool,

    /// Print the operator key legends after the display
    #[arg(short, long)]
    keys: bool,

    /// Print pending operations after the display
    #[arg(short, long)]
    stack: bool,

    /// Digits shown for results
    #[arg(long, default_value_t = DisplayConfig::default().result_digits)]
    result_digits: usize,

    /// Digits shown for operands in pending operations
    #[arg(long, default_value_t = DisplayConfig::default().label_digits)]
    label_digits: usize,

    /// Longest number that can be typed
    #[arg(long, default_value_t = DisplayConfig::default().max_input_len)]
    max_input: usize,

    /// Log more (-v debug, -vv trace). RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn display_config(&self) -> DisplayConfig {
        DisplayConfig {
            result_digits: self.result_digits.clamp(1, MAX_PRECISION),
            label_digits: self.label_digits.clamp(1, MAX_PRECISION),
            max_input_len: self.max_input.max(1),
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<(), Error> {
    let mut calculator = Calculator::new(args.display_config());

    let stdout = std::io::stdout();
    let lock = stdout.lock();
    let mut w = std::io::BufWriter::new(lock);

    if !args.input.is_empty() {
        for input in &args.input {
            type_line(&mut w, &mut calculator, input, args)?;
        }
        if !args.trace {
            render(&mut w, &calculator, args)?;
        }
    } else {
        let stdin = std::io::stdin();
        let reader = std::io::BufReader::new(stdin);
        let is_interactive = atty::is(atty::Stream::Stdin);

        if is_interactive {
            write!(&mut w, ">>> ")?;
            w.flush()?;
        }

        for line in reader.lines() {
            if let Err(e) = type_line(&mut w, &mut calculator, &line?, args) {
                w.flush()?;
                eprintln!("{}", e);
            }
            if !args.trace {
                render(&mut w, &calculator, args)?;
            }

            if is_interactive {
                write!(&mut w, ">>> ")?;
                w.flush()?;
            }
        }
    }
    w.flush()?;

    Ok(())
}

/// Press the key for every character of `line`. A numeric fault is reported
/// and typing carries on from the idle display.
fn type_line(
    w: &mut impl Write,
    calculator: &mut Calculator,
    line: &str,
    args: &Args,
) -> Result<(), Error> {
    for c in line.chars() {
        let Some(key) = Key::from_char(c)? else {
            continue;
        };
        if let Err(e) = keypad::press(calculator, key) {
            w.flush()?;
            eprintln!("Error: {}", e);
        }
        if args.trace {
            render(w, calculator, args)?;
        }
    }
    Ok(())
}

fn render(w: &mut impl Write, calculator: &Calculator, args: &Args) -> Result<(), Error> {
    writeln!(w, "{}", calculator.display())?;
    if args.keys {
        let legends: Vec<String> = OPERATOR_KEYS
            .iter()
            .map(|key| format!("[{}]", key.legend(calculator)))
            .collect();
        writeln!(w, "{}", legends.join(" "))?;
    }
    if args.stack {
        write!(w, "{}", calculator.stack())?;
    }
    Ok(())
}
