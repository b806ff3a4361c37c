//! sandbox-run: one-shot snippet execution from the command line

use clap::{Parser, Subcommand};
use console::style;
use log::{debug, info};
use playground_sandbox::{
    ExecutorBuilder, NamespaceConfig, PolicyTable, SecurityProfile, isolation, logging, utils,
};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sandbox-run")]
#[command(version, about = "Run a snippet through the playground sandbox", long_about = None)]
#[command(after_help = "EXAMPLES:
    sandbox-run run hello.py
    echo 'print(1 + 1)' | sandbox-run run -
    sandbox-run --profile moderate --timeout 8 run job.py
    sandbox-run policy
    sandbox-run check
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Limit preset
    #[arg(short = 'P', long, value_name = "PROFILE", global = true)]
    profile: Option<SecurityProfile>,

    /// Deadline in seconds (overrides the profile)
    #[arg(short, long, value_name = "SECONDS", global = true)]
    timeout: Option<u64>,

    /// Memory limit (256M, 1G) (overrides the profile)
    #[arg(short, long, value_name = "SIZE", global = true)]
    memory: Option<String>,

    /// Interpreter program
    #[arg(short, long, value_name = "PATH", global = true)]
    interpreter: Option<PathBuf>,

    /// Run in fresh user/net/ipc/uts namespaces
    #[arg(long, global = true)]
    isolate: bool,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a snippet from a file, or from stdin with `-`
    Run {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// List forbidden modules and call patterns
    Policy,

    /// List available security profiles
    Profiles,

    /// Check sandbox requirements
    Check,
}

fn main() {
    let cli = Cli::parse();

    logging::init_logger(cli.verbose);

    let outcome = match &cli.command {
        Commands::Run { file } => run_snippet(&cli, file),
        Commands::Policy => {
            list_policy(&PolicyTable::reference());
            Ok(())
        }
        Commands::Profiles => {
            list_security_profiles();
            Ok(())
        }
        Commands::Check => {
            check_requirements(cli.interpreter.as_deref());
            Ok(())
        }
    };

    if let Err(e) = outcome {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn read_source(file: &Path) -> io::Result<String> {
    if file == Path::new("-") {
        let mut source = String::new();
        io::stdin().read_to_string(&mut source)?;
        Ok(source)
    } else {
        std::fs::read_to_string(file)
    }
}

fn builder_from_flags(cli: &Cli) -> playground_sandbox::Result<ExecutorBuilder> {
    let profile = cli.profile.unwrap_or_default();
    debug!("Using profile: {:?} ({})", profile, profile.details());
    let mut builder = profile.apply(ExecutorBuilder::new());

    if let Some(t) = cli.timeout {
        debug!("Overriding deadline: {}s", t);
        builder = builder.deadline(Duration::from_secs(t));
    }
    if let Some(m) = &cli.memory {
        debug!("Overriding memory limit: {}", m);
        builder = builder.memory_limit_str(m)?;
    }
    if let Some(i) = &cli.interpreter {
        builder = builder.interpreter(i);
    }
    if cli.isolate {
        builder = builder.namespaces(NamespaceConfig::isolated());
    }

    Ok(builder)
}

fn run_snippet(cli: &Cli, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let source = read_source(file)?;
    let executor = builder_from_flags(cli)?.build()?;

    info!("Executing {} ({} bytes)", file.display(), source.len());
    let result = executor.execute_code(&source);

    io::stdout().write_all(result.stdout.as_bytes())?;
    io::stderr().write_all(result.stderr.as_bytes())?;
    if !result.stderr.is_empty() && !result.stderr.ends_with('\n') {
        eprintln!();
    }

    Ok(())
}

fn list_policy(policy: &PolicyTable) {
    info!("Listing forbidden table");
    println!("Forbidden modules:\n");
    for module in policy.modules() {
        println!("  {}", module);
    }
    println!("\nForbidden operations:\n");
    for pattern in policy.patterns() {
        println!("  {}", pattern);
    }
}

fn list_security_profiles() {
    info!("Listing available security profiles");
    println!("Available security profiles:\n");

    for profile in SecurityProfile::all() {
        println!(
            "  {:12} - {}",
            format!("{:?}", profile).to_lowercase(),
            profile.description()
        );
        println!("                 {}", profile.details());
        println!();
    }

    println!("Use --profile <PROFILE> to select a profile");
    println!("Individual settings can be overridden with specific flags");
}

fn check_requirements(interpreter: Option<&Path>) {
    info!("Checking sandbox requirements");
    println!("Checking sandbox requirements...\n");

    let interpreter =
        interpreter.unwrap_or(Path::new(playground_sandbox::config::DEFAULT_INTERPRETER));
    if utils::interpreter_available(interpreter) {
        println!("[✓] Interpreter {} reachable", interpreter.display());
    } else {
        println!("[✗] Interpreter {} NOT reachable", interpreter.display());
    }

    let blocked = isolation::seccomp::blocked_syscalls()
        .collect::<Vec<_>>()
        .join(", ");
    match isolation::seccomp::group_lock_filter() {
        Ok(_) => println!("[✓] Group-lock filter compiles ({} refused)", blocked),
        Err(e) => println!("[✗] Group-lock filter unavailable: {}", e),
    }

    if isolation::user_namespaces_available() {
        println!("[✓] Unprivileged user namespaces available (--isolate)");
    } else {
        println!("[✗] Unprivileged user namespaces NOT available");
    }

    if isolation::is_root() {
        println!("[!] Running as root: prefer a dedicated low-privilege account");
    }
}
