use tabp::{EvaluationContext, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt};

async fn query(stdout: &mut io::Stdout, lines: &mut io::Lines<io::BufReader<io::Stdin>>) -> io::Result<Option<String>> {
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;
    lines.next_line().await
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let mut context = EvaluationContext::new();
    let mut lines = io::BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    // One line is one complete input, expressions may not span lines here.
    while let Some(line) = query(&mut stdout, &mut lines).await? {
        match context.evaluate_str(&line) {
            Value::Error(err) => println!("Error: {}", err),
            value => println!("{}", value),
        }
    }

    Ok(())
}
