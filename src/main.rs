use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;

use switchbot::{Args, OutputFormat, fake_transport, real_transport, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let log_level = args.log_level();
        let output_format = args.output_format().unwrap_or(if stdout.is_terminal() {
            OutputFormat::Pretty
        } else {
            OutputFormat::Json
        });
        let (request, maybe_fake_args) = args.into_request_and_fake_args();
        let transport = match maybe_fake_args {
            Some(fake_args) => fake_transport(fake_args),
            None => real_transport(),
        };

        run(request, &mut stdout, transport, log_level, output_format).await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
