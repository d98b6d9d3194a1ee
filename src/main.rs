//! shell-exec binary entry point.

use std::io::Write;
use std::process::ExitCode;

use shell_exec::cli::{self, Args, EXIT_USAGE};
use shell_exec::config::Config;
use shell_exec::{
    logging, CheckOptions, CommandLine, ContainerOptions, ContainerTransport, ExecError,
    ExecHelper, ExecResult, LocalOptions, LocalTransport, Transport,
};
use tracing::debug;

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let _ = logging::try_init_with(Some(config.log_filter()));
    debug!("shell-exec v{}", env!("CARGO_PKG_VERSION"));

    let Some(command) = args.command_line() else {
        eprintln!("error: no command given (see --help)");
        return ExitCode::from(EXIT_USAGE);
    };

    let outcome = match args.container {
        Some(ref container) => {
            let mut transport = ContainerTransport::new(container);
            if let Some(ref runtime) = args.runtime {
                transport = transport.runtime(runtime);
            }
            let mut options = ContainerOptions::default();
            if let Some(ref dir) = args.workdir {
                options = options.workdir(dir.to_string_lossy());
            }
            run(transport, options, command, &config, &args)
        }
        None => {
            let mut options = LocalOptions::new();
            if let Some(ref dir) = args.workdir {
                options = options.cwd(dir);
            }
            run(LocalTransport::new(), options, command, &config, &args)
        }
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

/// Run the command and report it; the outer error is for setup failures.
fn run<T: Transport>(
    transport: T,
    transport_options: T::Options,
    command: CommandLine,
    config: &Config,
    args: &Args,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let helper: ExecHelper<T> = config.build_helper(transport)?;
    let options = config
        .exec_options::<T::Options>()
        .transport(transport_options);
    let check = CheckOptions::new()
        .expected(config.execution.expected.clone())
        .raise_on_err(!args.no_raise);

    let outcome = if config.execution.check_stderr {
        helper.check_stderr(command, &options, &check)
    } else {
        helper.check_call(command, &options, &check)
    };

    match &outcome {
        Ok(result) => report(result, args.json)?,
        Err(ExecError::CalledProcess(failure)) => {
            report(failure.result(), args.json)?;
            eprintln!("{failure}");
        }
        Err(ExecError::Timeout(timeout)) => {
            report(&timeout.result, args.json)?;
            eprintln!("error: {timeout}");
        }
        Err(e) => eprintln!("error: {e}"),
    }

    Ok(ExitCode::from(cli::exit_status(&outcome)))
}

fn report(result: &ExecResult, json: bool) -> std::io::Result<()> {
    if json {
        let summary = serde_json::to_string_pretty(&result.summary())?;
        println!("{summary}");
        return Ok(());
    }
    let mut stdout = std::io::stdout().lock();
    for line in result.stdout() {
        stdout.write_all(line)?;
    }
    stdout.flush()?;
    let mut stderr = std::io::stderr().lock();
    for line in result.stderr() {
        stderr.write_all(line)?;
    }
    stderr.flush()
}
