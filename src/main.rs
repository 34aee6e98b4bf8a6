use std::{
    env, fs,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{bail, Context};
use tabp::{EvaluationContext, Parser, TabpError, Value};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "usage: tabp [--quiet] [-e CODE]... [FILE]...";

struct Config {
    files: Vec<PathBuf>,
    expressions: Vec<String>,
    quiet: bool,
    prompt: String,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        let mut config = Self {
            files: Vec::new(),
            expressions: Vec::new(),
            quiet: false,
            prompt: env::var("TABP_PROMPT").unwrap_or_else(|_| "tabp> ".to_owned()),
        };

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-e" | "--eval" => match args.next() {
                    Some(code) => config.expressions.push(code),
                    None => bail!("-e needs an expression\n{}", USAGE),
                },
                "-q" | "--quiet" => config.quiet = true,
                "-h" | "--help" => {
                    println!("{}", USAGE);
                    std::process::exit(0);
                }
                flag if flag.starts_with('-') && flag != "-" => bail!("unknown option {}\n{}", flag, USAGE),
                file => config.files.push(PathBuf::from(file)),
            }
        }

        Ok(config)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("TABP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn check(result: Value) -> anyhow::Result<Value> {
    match result {
        Value::Error(error) => bail!("{}", error),
        value => Ok(value),
    }
}

fn repl(context: &mut EvaluationContext, config: &Config) -> anyhow::Result<()> {
    let mut parser = Parser::new(io::stdin().lock());
    let mut stdout = io::stdout();

    loop {
        if !config.quiet {
            write!(stdout, "{}", config.prompt)?;
            stdout.flush()?;
        }

        let expression = match parser.parse() {
            Ok(expression) => expression,
            Err(err) if err.is_end_of_stream() => break,
            Err(err) => {
                eprintln!("{}", err);
                parser.skip_line()?;
                continue;
            }
        };

        match context.evaluate(&expression) {
            Value::Error(error) => report(&error),
            Value::Nil => {}
            value => writeln!(stdout, "{}", value)?,
        }
    }

    if !config.quiet {
        writeln!(stdout)?;
    }
    Ok(())
}

fn report(error: &TabpError) {
    tracing::debug!(root_cause = %error.root_cause(), "evaluation failed");
    eprintln!("{}", error);
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let config = Config::from_env()?;
    let mut context = EvaluationContext::new();

    for path in &config.files {
        let file = fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        tracing::info!(path = %path.display(), "evaluating file");
        check(context.evaluate_reader(file))
            .with_context(|| format!("failed to evaluate {}", path.display()))?;
    }

    for code in &config.expressions {
        let value = check(context.evaluate_str(code))?;
        if !value.is_nil() {
            println!("{}", value);
        }
    }

    if config.files.is_empty() && config.expressions.is_empty() {
        repl(&mut context, &config)?;
    }

    Ok(())
}
